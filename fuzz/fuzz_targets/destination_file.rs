#![no_main]

//! Parse arbitrary destination files, and check that anything the renderer
//! accepts reads back unchanged.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sapstate_domain::{parse_destination_file, render_destination_file};
use sapstate_types::{Secret, SldDestination};

#[derive(Debug, Arbitrary)]
struct Input {
    raw: String,
    host: String,
    user: String,
    password: String,
    port: u16,
    https: bool,
}

fuzz_target!(|input: Input| {
    let _ = parse_destination_file(&input.raw);

    let mut dest = SldDestination::new(
        "slddest.cfg",
        input.user.clone(),
        Secret::new(input.password.clone()),
        input.host.clone(),
        input.port,
    );
    dest.https = input.https;
    let Ok(text) = render_destination_file(&dest) else {
        return;
    };
    let parsed = parse_destination_file(&text).expect("rendered file parses");
    assert_eq!(parsed.host.as_deref(), Some(input.host.as_str()));
    assert_eq!(parsed.user.as_deref(), Some(input.user.as_str()));
    assert_eq!(parsed.port, Some(input.port));
    assert_eq!(parsed.https, Some(input.https));
    assert_eq!(
        parsed.password.as_ref().map(Secret::expose),
        Some(input.password.as_str())
    );
});
