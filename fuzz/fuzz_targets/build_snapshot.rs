#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use rpki_validator::RouteValidity;
use rpki_validator::payload::{VrpList, VrpRecord, VrpSnapshot};

fuzz_target!{|data: &[u8]| {
    let vrps: Vec<VrpRecord> = match serde_json::from_slice(data) {
        Ok(vrps) => vrps,
        Err(_) => return,
    };
    let total = vrps.len();
    let snapshot = VrpSnapshot::from_list(VrpList::new(vrps), Utc::now());
    assert_eq!(snapshot.len() + snapshot.dropped(), total);

    // Every installed VRP validates its own prefix.
    for vrp in snapshot.iter() {
        let validity = RouteValidity::from_snapshot(
            vrp.prefix(), vrp.asn(), &snapshot
        );
        assert_eq!(validity.valid(), Some(true));
    }
}}
