#![no_main]
use libfuzzer_sys::fuzz_target;

use helios::soc::estimate_soc;

fuzz_target!(|data: [u8; 16]| {
    let (a, b) = data.split_at(8);
    let v1 = f64::from_le_bytes(a.try_into().unwrap_or_default());
    let v2 = f64::from_le_bytes(b.try_into().unwrap_or_default());

    let s1 = estimate_soc(Some(v1));
    let s2 = estimate_soc(Some(v2));
    if let (Some(s1), Some(s2)) = (s1, s2) {
        assert!(s1 <= 100 && s2 <= 100);
        if v1 < v2 {
            assert!(s1 <= s2, "{v1} -> {s1} but {v2} -> {s2}");
        }
    }
});
