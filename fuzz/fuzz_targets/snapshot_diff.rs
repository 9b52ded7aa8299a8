#![no_main]

//! Diffing two arbitrary JSON snapshots must never panic, and a snapshot
//! diffed against itself yields no events.

use bugbash_core::Snapshot;
use bugbash_core::diff::{classify, diff};
use bugbash_core::model::Bug;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if input.len() > 65_536 {
        return;
    }
    let Ok((previous, next)) = serde_json::from_str::<(Vec<Bug>, Vec<Bug>)>(input) else {
        return;
    };

    let previous = Snapshot::new(previous);
    let next = Snapshot::new(next);
    let _ = diff(Some(&previous), &next, 5);
    let _ = diff(Some(&previous), &next, 0);

    assert!(classify(&next, &next).is_empty());
    assert!(diff(Some(&next), &next, 1).is_empty());
});
