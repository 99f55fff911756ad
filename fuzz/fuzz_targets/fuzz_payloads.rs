#![no_main]
use libfuzzer_sys::fuzz_target;

use helios::telemetry::{CurrentPayload, HistoryBuffer, HistoryPayload};

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = serde_json::from_slice::<CurrentPayload>(data) {
        let _ = payload.into_reading(chrono::Utc::now());
    }

    if let Ok(payload) = serde_json::from_slice::<HistoryPayload>(data) {
        let (buffer, report) = HistoryBuffer::from_rows(payload.readings);
        assert_eq!(buffer.len(), report.accepted);
        // ascending and unique
        assert!(
            buffer
                .readings()
                .windows(2)
                .all(|w| w[0].timestamp < w[1].timestamp)
        );
        let _ = buffer.summary();
    }
});
