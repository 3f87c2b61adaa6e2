//! Property-based tests for the destination codec and comparison.
//!
//! These tests verify that:
//! - A rendered destination file parses back to exactly the input parameters
//! - A config that was just written never asks for another write
//! - Rendering is deterministic

use proptest::prelude::*;
use sapstate_domain::{
    diff_destination, parse_destination_file, plan_update, render_destination_file,
};
use sapstate_types::{Secret, SldDestination};

fn arb_destination() -> impl Strategy<Value = SldDestination> {
    (
        prop::string::string_regex(r"[a-z][a-z0-9.-]{0,30}").unwrap(),
        1u16..=u16::MAX,
        prop::string::string_regex(r"[A-Z_][A-Z0-9_]{0,15}").unwrap(),
        prop::string::string_regex(r"[ -~]{0,24}").unwrap(),
        any::<bool>(),
    )
        .prop_map(|(host, port, user, password, https)| {
            let mut d = SldDestination::new(
                "/usr/sap/S4H/SYS/global/slddest.cfg",
                user,
                Secret::new(password),
                host,
                port,
            );
            d.https = https;
            d
        })
}

proptest! {
    #[test]
    fn written_parameters_read_back_exactly(dest in arb_destination()) {
        let text = render_destination_file(&dest).unwrap();
        let obs = parse_destination_file(&text).unwrap();

        prop_assert_eq!(obs.host.as_deref(), Some(dest.host.as_str()));
        prop_assert_eq!(obs.port, Some(dest.port));
        prop_assert_eq!(obs.user.as_deref(), Some(dest.user.as_str()));
        prop_assert_eq!(obs.https, Some(dest.https));
        prop_assert_eq!(obs.password.as_ref().map(|p| p.expose()), Some(dest.password.expose()));
    }

    #[test]
    fn converged_config_needs_no_update(dest in arb_destination()) {
        let obs = parse_destination_file(&render_destination_file(&dest).unwrap()).unwrap();
        prop_assert!(diff_destination(&dest, &obs).is_empty());
        prop_assert!(plan_update(&dest, Some(&obs), false).is_none());
    }

    #[test]
    fn rendering_is_deterministic(dest in arb_destination()) {
        let a = render_destination_file(&dest).unwrap();
        let b = render_destination_file(&dest.clone()).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn any_port_change_is_detected(dest in arb_destination(), other in 1u16..=u16::MAX) {
        prop_assume!(other != dest.port);
        let obs = parse_destination_file(&render_destination_file(&dest).unwrap()).unwrap();
        let mut moved = dest.clone();
        moved.port = other;
        prop_assert!(plan_update(&moved, Some(&obs), false).is_some());
    }
}
