#![no_main]

//! Similarity scores stay in `[0, 1]` and are symmetric for any text.
//! The input is split into the two texts at the first newline.

use bugbash_search::similarity;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if input.len() > 8192 {
        return;
    }

    let (a, b) = input.split_once('\n').unwrap_or((input, ""));
    let ab = similarity(a, b);
    let ba = similarity(b, a);
    assert!((0.0..=1.0).contains(&ab));
    assert!((ab - ba).abs() < 1e-12);
});
