#![no_main]

//! Arbitrary `sapcontrol` stdout through the reply and table parsers.

use libfuzzer_sys::fuzz_target;
use sapstate_control::output::parse_reply;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    for function in ["GetProcessList", "ABAPReadSyslog", "ParameterValue"] {
        let Ok(reply) = parse_reply(function, s) else {
            continue;
        };
        let table = reply.table();
        for rec in table.records() {
            let _ = rec.get("name");
            let _ = rec.parsed::<u32>("pid");
        }
        // Rows are padded or capped to the header width.
        let width = table.header.len().max(1);
        assert!(table.rows.iter().all(|r| r.len() == width));
    }
});
