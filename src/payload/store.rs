//! A store of VRPs that can be searched for covering prefixes.
//!
//! This is a private module. Its public types are re-exported by the parent.

use std::collections::{BTreeSet, HashMap};
use ipnet::IpNet;
use super::vrp::Vrp;


//------------ PrefixStore ---------------------------------------------------

/// A collection of VRPs indexed by their prefix.
///
/// The store answers the one question route origin validation needs: which
/// VRPs have a prefix that is equal to or less specific than a given
/// prefix. It does so by probing every prefix length that is actually in
/// use for the address family, from the least specific to the most
/// specific, so that a lookup is bounded by the address length regardless
/// of the number of VRPs.
///
/// The store is built once and then only read. Replacing the data happens
/// by building a new store.
#[derive(Clone, Debug, Default)]
pub struct PrefixStore {
    /// All VRPs in insertion order.
    vrps: Vec<Vrp>,

    /// The indexes into `vrps` for each prefix.
    by_prefix: HashMap<IpNet, Vec<usize>>,

    /// The prefix lengths present for IPv4.
    v4_lengths: BTreeSet<u8>,

    /// The prefix lengths present for IPv6.
    v6_lengths: BTreeSet<u8>,
}

impl PrefixStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a VRP to the store.
    ///
    /// Duplicates are not removed: every VRP added takes part in lookups.
    pub fn insert(&mut self, vrp: Vrp) {
        let prefix = vrp.prefix();
        match prefix {
            IpNet::V4(_) => self.v4_lengths.insert(prefix.prefix_len()),
            IpNet::V6(_) => self.v6_lengths.insert(prefix.prefix_len()),
        };
        self.by_prefix.entry(prefix).or_default().push(self.vrps.len());
        self.vrps.push(vrp);
    }

    /// Returns all VRPs whose prefix covers `prefix`.
    ///
    /// The VRPs are returned from least specific to most specific prefix.
    /// VRPs with the same prefix are returned in insertion order.
    pub fn covering(&self, prefix: IpNet) -> Vec<&Vrp> {
        let prefix = prefix.trunc();
        let lengths = match prefix {
            IpNet::V4(_) => &self.v4_lengths,
            IpNet::V6(_) => &self.v6_lengths,
        };
        let mut res = Vec::new();
        for &len in lengths.range(..=prefix.prefix_len()) {
            let candidate = match IpNet::new(prefix.addr(), len) {
                Ok(candidate) => candidate.trunc(),
                Err(_) => continue,
            };
            if let Some(indexes) = self.by_prefix.get(&candidate) {
                res.extend(indexes.iter().map(|&idx| &self.vrps[idx]));
            }
        }
        res
    }

    /// Returns the number of VRPs in the store.
    pub fn len(&self) -> usize {
        self.vrps.len()
    }

    /// Returns whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.vrps.is_empty()
    }

    /// Returns an iterator over all VRPs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Vrp> + '_ {
        self.vrps.iter()
    }
}

impl FromIterator<Vrp> for PrefixStore {
    fn from_iter<I: IntoIterator<Item = Vrp>>(iter: I) -> Self {
        let mut res = Self::new();
        iter.into_iter().for_each(|vrp| res.insert(vrp));
        res
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use std::str::FromStr;
    use super::*;
    use super::super::vrp::{Asn, Vrp};

    fn vrp(prefix: &str, max_len: u8, asn: u32) -> Vrp {
        Vrp::new(IpNet::from_str(prefix).unwrap(), max_len, Asn::from(asn))
            .unwrap()
    }

    fn net(prefix: &str) -> IpNet {
        IpNet::from_str(prefix).unwrap()
    }

    #[test]
    fn covering_lookup() {
        let store: PrefixStore = [
            vrp("10.0.0.0/8", 8, 1),
            vrp("10.1.0.0/16", 24, 2),
            vrp("10.1.0.0/16", 16, 3),
            vrp("10.1.2.0/24", 24, 4),
            vrp("11.0.0.0/8", 8, 5),
            vrp("2001:db8::/32", 48, 6),
        ].into_iter().collect();
        assert_eq!(store.len(), 6);

        let asns = |prefix| {
            store.covering(net(prefix)).into_iter().map(|vrp| {
                vrp.asn().into_u32()
            }).collect::<Vec<_>>()
        };
        assert_eq!(asns("10.1.2.0/24"), vec![1, 2, 3, 4]);
        assert_eq!(asns("10.1.3.0/24"), vec![1, 2, 3]);
        assert_eq!(asns("10.1.0.0/16"), vec![1, 2, 3]);
        assert_eq!(asns("10.0.0.0/8"), vec![1]);
        assert_eq!(asns("10.0.0.0/7"), Vec::<u32>::new());
        assert_eq!(asns("12.0.0.0/8"), Vec::<u32>::new());
        assert_eq!(asns("2001:db8:1::/48"), vec![6]);
        assert_eq!(asns("2001:db9::/32"), Vec::<u32>::new());
    }

    #[test]
    fn families_are_separate() {
        let store: PrefixStore = [vrp("0.0.0.0/0", 32, 1)].into_iter().collect();
        assert_eq!(store.covering(net("192.0.2.0/24")).len(), 1);
        assert!(store.covering(net("::/0")).is_empty());
        assert!(store.covering(net("2001:db8::/32")).is_empty());
    }

    #[test]
    fn host_bits_are_ignored() {
        let store: PrefixStore = [vrp("203.0.0.0/8", 8, 1)].into_iter().collect();
        assert_eq!(store.covering(net("203.126.124.0/8")).len(), 1);
        assert!(!store.is_empty());
        assert!(PrefixStore::new().is_empty());
    }
}
