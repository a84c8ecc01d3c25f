//! A connector for VRPs provided by the library user.

use crate::payload::VrpList;
use crate::utils::sync::RwLock;


//------------ ExternalConnector ---------------------------------------------

/// A connector that hands out whatever list it was given last.
///
/// The list is not checked when it is set. Malformed entries are dropped
/// when the cache is rebuilt from it, just like for every other source.
#[derive(Debug, Default)]
pub struct ExternalConnector {
    vrps: RwLock<VrpList>,
}

impl ExternalConnector {
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a connector starting out with the given list.
    pub fn with_vrps(list: VrpList) -> Self {
        ExternalConnector { vrps: RwLock::new(list) }
    }

    pub fn get_vrps(&self) -> Option<VrpList> {
        Some(self.vrps.read().clone())
    }

    pub fn set_vrps(&self, list: VrpList) {
        *self.vrps.write() = list;
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use chrono::Utc;
    use crate::payload::VrpRecord;
    use super::*;

    #[test]
    fn set_and_get() {
        let conn = ExternalConnector::new();
        assert!(conn.get_vrps().unwrap().vrps.is_empty());
        let now = Utc::now();
        conn.set_vrps(
            VrpList::new(vec![VrpRecord::new("10.0.0.0/8", 8, 1)])
                .with_build_time(now)
        );
        let list = conn.get_vrps().unwrap();
        assert_eq!(list.vrps.len(), 1);
        assert_eq!(list.build_time, Some(now));
    }
}
