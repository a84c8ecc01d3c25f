#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use rpki_validator::meta::{MetaIndex, ObjectType};

fuzz_target!{|data: &[u8]| {
    let index = match MetaIndex::from_reader(data) {
        Ok(index) => index,
        Err(_) => return,
    };

    // Chain walks must terminate whatever the key identifiers look like.
    let now = Utc::now();
    for roa in index.get_by_type(&ObjectType::Roa) {
        for vrp in &roa.vrps {
            let chain = index.ancestor_chain(&vrp.key());
            assert!(chain.iter().any(|entry| entry.object.hash_id == roa.hash_id));
            let _ = index.expiring(&vrp.key(), now, now);
        }
    }
}}
