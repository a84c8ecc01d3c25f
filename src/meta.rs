//! An index of RPKI object metadata.
//!
//! The index is built from a stream of metadata records, one JSON object
//! per line, describing the certificates, ROAs, manifests, and other
//! objects of the RPKI repository. It links ROAs to the VRPs derived from
//! them and certificates to their issuers via their key identifiers. This
//! allows reconstructing the certification path of a VRP and finding out
//! which objects on that path will expire when.
//!
//! Manifests are kept apart from all other objects. A very large number of
//! objects share a single manifest and they are only ever looked up via
//! the publication point they describe.

use std::{fmt, io};
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use crate::payload::{Asn, VrpKey};
use crate::utils::date::deserialize_timestamp;


//------------ Configuration -------------------------------------------------

/// The maximum number of generations walked when building a chain.
///
/// Key identifiers come from external data and may well form loops or
/// absurdly long chains. This guarantees we stop.
pub const MAX_GENERATIONS: usize = 100;


//------------ ObjectType ----------------------------------------------------

/// The type of an RPKI object.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ObjectType {
    Cert,
    Roa,
    Manifest,
    Crl,
    Aspa,
    Gbr,
    RouterCert,
    Other(String),
}

impl From<&str> for ObjectType {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "cert" | "ca_cert" | "certificate" | "ca" => ObjectType::Cert,
            "roa" => ObjectType::Roa,
            "manifest" | "mft" => ObjectType::Manifest,
            "crl" => ObjectType::Crl,
            "aspa" => ObjectType::Aspa,
            "gbr" => ObjectType::Gbr,
            "router_cert" | "routercert" | "bgpsec" => ObjectType::RouterCert,
            other => ObjectType::Other(other.into()),
        }
    }
}

impl From<String> for ObjectType {
    fn from(s: String) -> Self {
        ObjectType::from(s.as_str())
    }
}

impl From<ObjectType> for String {
    fn from(object_type: ObjectType) -> Self {
        object_type.to_string()
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ObjectType::Cert => "cert",
            ObjectType::Roa => "roa",
            ObjectType::Manifest => "manifest",
            ObjectType::Crl => "crl",
            ObjectType::Aspa => "aspa",
            ObjectType::Gbr => "gbr",
            ObjectType::RouterCert => "router_cert",
            ObjectType::Other(ref other) => other,
        })
    }
}


//------------ ManifestKey ---------------------------------------------------

/// The key under which a manifest is stored.
///
/// This is the directory of the publication point the manifest describes,
/// derived from a file path.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ManifestKey(String);

impl ManifestKey {
    /// Derives the key from the path of a file in the publication point.
    pub fn from_path(path: &str) -> Self {
        let path = path.trim_end_matches('/');
        ManifestKey(match path.rsplit_once('/') {
            Some((dir, _)) => dir.into(),
            None => String::new(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}


//------------ ObjectRecord --------------------------------------------------

/// The metadata of a single RPKI object.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ObjectRecord {
    /// The object type.
    #[serde(rename = "type")]
    pub object_type: ObjectType,

    /// The hash identifying the object.
    #[serde(alias = "hashId", alias = "hash")]
    pub hash_id: String,

    /// The subject key identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ski: Option<String>,

    /// The authority key identifier, i.e., the SKI of the issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aki: Option<String>,

    /// The beginning of the validity period.
    #[serde(
        default, alias = "validSince", alias = "valid_from",
        deserialize_with = "deserialize_timestamp",
    )]
    pub valid_since: Option<DateTime<Utc>>,

    /// The end of the validity period.
    #[serde(
        default, alias = "validUntil", alias = "valid_to",
        deserialize_with = "deserialize_timestamp",
    )]
    pub valid_until: Option<DateTime<Utc>>,

    /// The path of the object in the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// The VRPs contained in a ROA.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vrps: Vec<MetaVrp>,

    /// The path of the manifest listing the object, if given explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
}

impl ObjectRecord {
    /// Creates a minimal record.
    pub fn new(object_type: ObjectType, hash_id: impl Into<String>) -> Self {
        ObjectRecord {
            object_type,
            hash_id: hash_id.into(),
            ski: None,
            aki: None,
            valid_since: None,
            valid_until: None,
            file: None,
            vrps: Vec::new(),
            manifest: None,
        }
    }

    /// Returns the key of the manifest responsible for this object.
    ///
    /// An explicitly given manifest path takes precedence. Otherwise the
    /// object is assumed to be listed on the manifest of the publication
    /// point its file lives in.
    pub fn manifest_key(&self) -> Option<ManifestKey> {
        self.manifest.as_deref().or(self.file.as_deref()).map(
            ManifestKey::from_path
        )
    }

    /// Returns whether the object is valid at `as_of` and expires at `at`.
    ///
    /// An object without a start of its validity is considered valid
    /// already.
    pub fn expires_exactly(
        &self, at: DateTime<Utc>, as_of: DateTime<Utc>
    ) -> bool {
        self.valid_until == Some(at)
            && self.valid_since.map(|since| since <= as_of).unwrap_or(true)
    }
}


//------------ MetaVrp -------------------------------------------------------

/// A VRP as listed in a ROA’s metadata.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetaVrp {
    pub prefix: IpNet,

    #[serde(alias = "asn")]
    pub asid: Asn,

    #[serde(alias = "maxLength", alias = "max_length")]
    pub maxlen: u8,
}

impl MetaVrp {
    pub fn key(&self) -> VrpKey {
        VrpKey::new(self.prefix, self.asid, self.maxlen)
    }
}


//------------ ChainEntry ----------------------------------------------------

/// An object on a certification path together with its manifest.
#[derive(Clone, Debug, Serialize)]
pub struct ChainEntry {
    pub object: Arc<ObjectRecord>,
    pub manifest: Option<Arc<ObjectRecord>>,
}


//------------ IngestReport --------------------------------------------------

/// What happened while ingesting a metadata stream.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IngestReport {
    /// The number of records added to the index.
    pub added: usize,

    /// The number of lines skipped because they were malformed.
    pub skipped: usize,
}


//------------ MetaIndex -----------------------------------------------------

/// The index over RPKI object metadata.
#[derive(Clone, Debug, Default)]
pub struct MetaIndex {
    /// All objects but manifests by their hash.
    hashes: HashMap<String, Arc<ObjectRecord>>,

    /// All objects but manifests by their type.
    types: HashMap<ObjectType, Vec<Arc<ObjectRecord>>>,

    /// Objects by their subject key identifier.
    ski: HashMap<String, Vec<Arc<ObjectRecord>>>,

    /// Objects by their authority key identifier.
    aki: HashMap<String, Vec<Arc<ObjectRecord>>>,

    /// ROAs by the VRPs they contain.
    vrps: HashMap<VrpKey, Vec<Arc<ObjectRecord>>>,

    /// Manifests by their publication point.
    manifests: HashMap<ManifestKey, Arc<ObjectRecord>>,
}

impl MetaIndex {
    /// Creates a new, empty index.
    pub fn new() -> Self {
        Default::default()
    }

    /// Builds an index from a stream of JSON lines.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, io::Error> {
        let mut res = Self::new();
        res.ingest(reader)?;
        Ok(res)
    }

    /// Adds all records from a stream of JSON lines.
    ///
    /// The stream is processed line by line, so it never needs to be
    /// present in memory in full. Lines that aren’t valid records are
    /// skipped. Only an error reading from `reader` ends ingestion early.
    pub fn ingest<R: BufRead>(
        &mut self, mut reader: R
    ) -> Result<IngestReport, io::Error> {
        let mut report = IngestReport::default();
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break
            }
            self.ingest_line(&line, &mut report);
        }
        info!(
            "Object metadata: added {} records, skipped {} lines.",
            report.added, report.skipped
        );
        Ok(report)
    }

    /// Adds a single line of a metadata stream and updates `report`.
    ///
    /// Blank lines are ignored and not counted.
    pub fn ingest_line(&mut self, line: &[u8], report: &mut IngestReport) {
        if line.iter().all(u8::is_ascii_whitespace) {
            return
        }
        if self.add_line(line) {
            report.added += 1;
        }
        else {
            report.skipped += 1;
        }
    }

    /// Adds a record encoded as a single JSON object.
    ///
    /// Returns whether the record was added.
    pub fn add_line(&mut self, line: &[u8]) -> bool {
        match serde_json::from_slice::<ObjectRecord>(line) {
            Ok(record) => self.add(record),
            Err(err) => {
                debug!("Skipping object metadata line: {}", err);
                false
            }
        }
    }

    /// Adds a record.
    ///
    /// Returns whether the record was added. Manifests without a file path
    /// cannot be keyed and are not added.
    pub fn add(&mut self, record: ObjectRecord) -> bool {
        if record.object_type == ObjectType::Manifest {
            let key = match record.file.as_deref() {
                Some(file) => ManifestKey::from_path(file),
                None => {
                    debug!(
                        "Skipping manifest {} without file.", record.hash_id
                    );
                    return false
                }
            };
            self.manifests.insert(key, Arc::new(record));
            return true
        }

        let record = Arc::new(record);
        self.hashes.insert(record.hash_id.clone(), record.clone());
        self.types.entry(
            record.object_type.clone()
        ).or_default().push(record.clone());
        if let Some(ski) = record.ski.as_ref() {
            self.ski.entry(ski.clone()).or_default().push(record.clone());
        }
        if let Some(aki) = record.aki.as_ref() {
            self.aki.entry(aki.clone()).or_default().push(record.clone());
        }
        for vrp in &record.vrps {
            self.vrps.entry(vrp.key()).or_default().push(record.clone());
        }
        true
    }

    /// Returns the object with the given hash.
    pub fn get(&self, hash_id: &str) -> Option<&Arc<ObjectRecord>> {
        self.hashes.get(hash_id)
    }

    /// Returns all objects of the given type.
    ///
    /// Manifests are not included here. Use [`manifests`][Self::manifests]
    /// instead.
    pub fn get_by_type(&self, object_type: &ObjectType) -> &[Arc<ObjectRecord>] {
        self.types.get(object_type).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the ROAs containing the given VRP.
    pub fn get_vrps(&self, vrp: &VrpKey) -> &[Arc<ObjectRecord>] {
        self.vrps.get(vrp).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the manifest for the given publication point.
    pub fn manifest(&self, key: &ManifestKey) -> Option<&Arc<ObjectRecord>> {
        self.manifests.get(key)
    }

    /// Returns an iterator over all manifests.
    pub fn manifests(&self) -> impl Iterator<Item = &Arc<ObjectRecord>> + '_ {
        self.manifests.values()
    }

    /// Returns the manifest responsible for the given object.
    pub fn manifest_for(
        &self, object: &ObjectRecord
    ) -> Option<&Arc<ObjectRecord>> {
        object.manifest_key().and_then(|key| self.manifests.get(&key))
    }

    /// Returns the issuers of the given objects.
    ///
    /// Each object appears only once in the result even if it issued
    /// several of the given objects. An object is never its own issuer.
    pub fn parents(
        &self, objects: &[Arc<ObjectRecord>]
    ) -> Vec<Arc<ObjectRecord>> {
        Self::related(objects, &self.ski, |object| object.aki.as_ref())
    }

    /// Returns the objects issued by the given objects.
    ///
    /// Each object appears only once in the result. An object is never its
    /// own child.
    pub fn children(
        &self, objects: &[Arc<ObjectRecord>]
    ) -> Vec<Arc<ObjectRecord>> {
        Self::related(objects, &self.aki, |object| object.ski.as_ref())
    }

    fn related<'a>(
        objects: &'a [Arc<ObjectRecord>],
        index: &HashMap<String, Vec<Arc<ObjectRecord>>>,
        link: impl Fn(&'a ObjectRecord) -> Option<&'a String>,
    ) -> Vec<Arc<ObjectRecord>> {
        let mut seen = HashSet::new();
        let mut res = Vec::new();
        for object in objects {
            let candidates = match link(object).and_then(|id| index.get(id)) {
                Some(candidates) => candidates,
                None => continue
            };
            for candidate in candidates {
                if candidate.hash_id == object.hash_id {
                    continue
                }
                if seen.insert(candidate.hash_id.as_str()) {
                    res.push(candidate.clone())
                }
            }
        }
        res
    }

    /// Returns the certification path of a VRP.
    ///
    /// The path starts with all ROAs containing the VRP, followed by their
    /// issuers, the issuers’ issuers, and so on. Every object appears once.
    /// Each entry carries the manifest of the object if it is known.
    pub fn ancestor_chain(&self, vrp: &VrpKey) -> Vec<ChainEntry> {
        let mut seen = HashSet::new();
        let mut generation: Vec<_> = self.get_vrps(vrp).iter().filter(|roa| {
            seen.insert(roa.hash_id.clone())
        }).cloned().collect();
        let mut chain = Vec::new();
        let mut count = 0;
        while !generation.is_empty() {
            if count == MAX_GENERATIONS {
                debug!(
                    "Certification path for {} exceeds {} generations.",
                    vrp, MAX_GENERATIONS
                );
                break
            }
            count += 1;
            let parents = self.parents(&generation);
            chain.append(&mut generation);
            generation = parents.into_iter().filter(|parent| {
                seen.insert(parent.hash_id.clone())
            }).collect();
        }
        chain.into_iter().map(|object| {
            ChainEntry {
                manifest: self.manifest_for(&object).cloned(),
                object,
            }
        }).collect()
    }

    /// Returns the objects on a VRP’s path that expire at the given time.
    ///
    /// Only objects already valid at `as_of` are considered. Manifests are
    /// listed as objects in their own right, each one only once.
    pub fn expiring(
        &self,
        vrp: &VrpKey,
        expires_at: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Vec<Arc<ObjectRecord>> {
        let mut manifests = HashSet::new();
        let mut res = Vec::new();
        for entry in self.ancestor_chain(vrp) {
            if entry.object.expires_exactly(expires_at, as_of) {
                res.push(entry.object.clone());
            }
            if let Some(manifest) = entry.manifest {
                if manifest.expires_exactly(expires_at, as_of)
                    && manifests.insert(manifest.hash_id.clone())
                {
                    res.push(manifest);
                }
            }
        }
        res
    }

    /// Returns the number of objects including manifests.
    pub fn len(&self) -> usize {
        self.hashes.len() + self.manifests.len()
    }

    /// Returns whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty() && self.manifests.is_empty()
    }

    /// Drops all content.
    pub fn clear(&mut self) {
        self.hashes.clear();
        self.types.clear();
        self.ski.clear();
        self.aki.clear();
        self.vrps.clear();
        self.manifests.clear();
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use std::str::FromStr;
    use chrono::TimeZone;
    use super::*;

    fn key(prefix: &str, asn: u32, max_len: u8) -> VrpKey {
        VrpKey::new(IpNet::from_str(prefix).unwrap(), asn.into(), max_len)
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    const DUMP: &str = r#"
{"type": "roa", "hash_id": "r1", "ski": "S1", "aki": "A1", "valid_since": 1000, "valid_until": 5000, "file": "repo/ca1/r1.roa", "vrps": [{"prefix": "1.2.3.0/24", "asid": 64500, "maxlen": 24}]}
{"type": "cert", "hash_id": "c1", "ski": "A1", "aki": "T1", "valid_since": 1000, "valid_until": 5000, "file": "repo/ta/c1.cer"}
{"type": "cert", "hash_id": "ta", "ski": "T1", "aki": "T1", "valid_since": 500, "valid_until": 9000, "file": "repo/ta.cer"}
{"type": "manifest", "hash_id": "m1", "aki": "A1", "valid_since": 1000, "valid_until": 5000, "file": "repo/ca1/ca1.mft"}
{"type": "manifest", "hash_id": "m2", "aki": "T1", "valid_since": 1000, "valid_until": 6000, "file": "repo/ta/ta.mft"}
{"type": "crl", "hash_id": "l1", "aki": "A1", "valid_since": 1000, "valid_until": 5000, "file": "repo/ca1/ca1.crl"}
this is not json
{"hash_id": "notype"}

{"type": "roa", "hash_id": "r2", "ski": "S2", "aki": "A1", "valid_since": 3000, "valid_until": 5000, "file": "repo/ca1/r2.roa", "vrps": [{"prefix": "1.2.3.0/24", "asid": 64500, "maxlen": 24}, {"prefix": "5.6.0.0/16", "asid": 64501, "maxlen": 16}]}
"#;

    fn index() -> MetaIndex {
        let mut index = MetaIndex::new();
        let report = index.ingest(DUMP.as_bytes()).unwrap();
        assert_eq!(report, IngestReport { added: 7, skipped: 2 });
        index
    }

    fn hashes(objects: &[Arc<ObjectRecord>]) -> Vec<&str> {
        let mut res: Vec<_> = objects.iter().map(|object| {
            object.hash_id.as_str()
        }).collect();
        res.sort_unstable();
        res
    }

    #[test]
    fn lookups() {
        let index = index();
        assert_eq!(index.len(), 7);
        assert_eq!(index.get("c1").unwrap().object_type, ObjectType::Cert);
        assert!(index.get("m1").is_none());
        assert_eq!(
            hashes(index.get_by_type(&ObjectType::Roa)), vec!["r1", "r2"]
        );
        assert!(index.get_by_type(&ObjectType::Manifest).is_empty());
        assert_eq!(index.manifests().count(), 2);
        assert_eq!(
            hashes(index.get_vrps(&key("1.2.3.0/24", 64500, 24))),
            vec!["r1", "r2"]
        );
        assert_eq!(
            hashes(index.get_vrps(&key("5.6.0.0/16", 64501, 16))), vec!["r2"]
        );
        assert!(index.get_vrps(&key("1.2.3.0/24", 64500, 25)).is_empty());
        assert_eq!(
            index.manifest(&ManifestKey::from_path("repo/ca1/x")).unwrap()
                .hash_id,
            "m1"
        );
    }

    #[test]
    fn parents_and_children() {
        let index = index();
        let roas = index.get_by_type(&ObjectType::Roa).to_vec();
        // Both ROAs share the same issuer which appears only once.
        assert_eq!(hashes(&index.parents(&roas)), vec!["c1"]);

        let ta = vec![index.get("ta").unwrap().clone()];
        // The trust anchor is self-signed but not its own parent.
        assert!(index.parents(&ta).is_empty());
        assert_eq!(hashes(&index.children(&ta)), vec!["c1"]);

        let c1 = vec![index.get("c1").unwrap().clone()];
        assert_eq!(hashes(&index.children(&c1)), vec!["l1", "r1", "r2"]);
    }

    #[test]
    fn ancestor_chain() {
        let index = index();
        let chain = index.ancestor_chain(&key("1.2.3.0/24", 64500, 24));
        let objects: Vec<_> = chain.iter().map(|entry| {
            entry.object.clone()
        }).collect();
        assert_eq!(hashes(&objects), vec!["c1", "r1", "r2", "ta"]);
        for entry in &chain {
            let manifest = entry.manifest.as_ref().map(|manifest| {
                manifest.hash_id.as_str()
            });
            match entry.object.hash_id.as_str() {
                "r1" | "r2" => assert_eq!(manifest, Some("m1")),
                "c1" => assert_eq!(manifest, Some("m2")),
                _ => assert_eq!(manifest, None),
            }
        }
        assert!(index.ancestor_chain(&key("9.9.9.0/24", 1, 24)).is_empty());
    }

    #[test]
    fn parent_cert_is_found_for_roa() {
        let mut index = MetaIndex::new();
        let mut roa = ObjectRecord::new(ObjectType::Roa, "r1");
        roa.ski = Some("S1".into());
        roa.aki = Some("A1".into());
        roa.vrps.push(MetaVrp {
            prefix: IpNet::from_str("1.2.3.0/24").unwrap(),
            asid: Asn::from_u32(64500),
            maxlen: 24,
        });
        let mut cert = ObjectRecord::new(ObjectType::Cert, "c1");
        cert.ski = Some("A1".into());
        assert!(index.add(roa));
        assert!(index.add(cert));
        let chain = index.ancestor_chain(&key("1.2.3.0/24", 64500, 24));
        let objects: Vec<_> = chain.into_iter().map(|entry| {
            entry.object
        }).collect();
        assert_eq!(hashes(&objects), vec!["c1", "r1"]);
    }

    #[test]
    fn cyclic_chains_terminate() {
        let mut index = MetaIndex::new();
        let mut roa = ObjectRecord::new(ObjectType::Roa, "r");
        roa.aki = Some("X".into());
        roa.vrps.push(MetaVrp {
            prefix: IpNet::from_str("10.0.0.0/8").unwrap(),
            asid: Asn::from_u32(1),
            maxlen: 8,
        });
        index.add(roa);
        let mut a = ObjectRecord::new(ObjectType::Cert, "a");
        a.ski = Some("X".into());
        a.aki = Some("Y".into());
        let mut b = ObjectRecord::new(ObjectType::Cert, "b");
        b.ski = Some("Y".into());
        b.aki = Some("X".into());
        index.add(a);
        index.add(b);
        let chain = index.ancestor_chain(&key("10.0.0.0/8", 1, 8));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn long_chains_are_capped() {
        let mut index = MetaIndex::new();
        let mut roa = ObjectRecord::new(ObjectType::Roa, "r");
        roa.aki = Some("k0".into());
        roa.vrps.push(MetaVrp {
            prefix: IpNet::from_str("10.0.0.0/8").unwrap(),
            asid: Asn::from_u32(1),
            maxlen: 8,
        });
        index.add(roa);
        for i in 0..(MAX_GENERATIONS * 2) {
            let mut cert = ObjectRecord::new(
                ObjectType::Cert, format!("c{}", i)
            );
            cert.ski = Some(format!("k{}", i));
            cert.aki = Some(format!("k{}", i + 1));
            index.add(cert);
        }
        let chain = index.ancestor_chain(&key("10.0.0.0/8", 1, 8));
        assert_eq!(chain.len(), MAX_GENERATIONS);
    }

    #[test]
    fn expiring() {
        let index = index();
        let vrp = key("1.2.3.0/24", 64500, 24);

        // At 2000, r2 isn’t valid yet.
        assert_eq!(
            hashes(&index.expiring(&vrp, ts(5000), ts(2000))),
            vec!["c1", "m1", "r1"]
        );
        assert_eq!(
            hashes(&index.expiring(&vrp, ts(5000), ts(3000))),
            vec!["c1", "m1", "r1", "r2"]
        );
        assert_eq!(
            hashes(&index.expiring(&vrp, ts(6000), ts(3000))), vec!["m2"]
        );
        assert_eq!(
            hashes(&index.expiring(&vrp, ts(9000), ts(3000))), vec!["ta"]
        );
        assert!(index.expiring(&vrp, ts(7000), ts(3000)).is_empty());
    }

    #[test]
    fn manifest_keys() {
        assert_eq!(
            ManifestKey::from_path("rpki.example.net/repo/ca/x.roa").as_str(),
            "rpki.example.net/repo/ca"
        );
        assert_eq!(ManifestKey::from_path("x.roa").as_str(), "");
        let mut record = ObjectRecord::new(ObjectType::Roa, "r");
        record.file = Some("a/b/r.roa".into());
        assert_eq!(record.manifest_key().unwrap().as_str(), "a/b");
        record.manifest = Some("c/d/m.mft".into());
        assert_eq!(record.manifest_key().unwrap().as_str(), "c/d");
    }

    #[test]
    fn clear() {
        let mut index = index();
        assert!(!index.is_empty());
        index.clear();
        assert!(index.is_empty());
        assert!(index.get_vrps(&key("1.2.3.0/24", 64500, 24)).is_empty());
    }

    #[test]
    fn object_types() {
        assert_eq!(ObjectType::from("MFT"), ObjectType::Manifest);
        assert_eq!(ObjectType::from("ca_cert"), ObjectType::Cert);
        assert_eq!(
            ObjectType::from("tak"), ObjectType::Other("tak".into())
        );
        assert_eq!(ObjectType::Other("tak".into()).to_string(), "tak");
    }
}
