// The `unused_crate_dependencies` lint checks every crate in a package separately.
// See <https://github.com/rust-lang/rust/issues/57274>.
#![allow(unused_crate_dependencies)]

use core::cell::Cell;

use features::Feature;
use log::Level;

#[test]
fn only_enabled_features_log() {
    testing_logger::setup();

    let evaluations = Cell::new(0);

    let to_slot = || {
        evaluations.set(evaluations.get() + 1);
        16
    };

    features::log!(
        WarnOnStateCacheSlotProcessing,
        "processing slots for checkpoint state (from slot: 3, to slot: {})",
        to_slot(),
    );

    // Message arguments are not evaluated for disabled features.
    assert_eq!(evaluations.get(), 0);

    Feature::WarnOnStateCacheSlotProcessing.enable();

    features::log!(
        WarnOnStateCacheSlotProcessing,
        "processing slots for checkpoint state (from slot: 3, to slot: {})",
        to_slot(),
    );

    features::log!(IgnoreAttestationsForUnknownBlocks, "dropping attestation for unknown block");

    Feature::WarnOnStateCacheSlotProcessing.warn("state cache lock timed out");

    assert_eq!(evaluations.get(), 1);

    testing_logger::validate(|logs| {
        itertools::assert_equal(
            logs.iter().map(|log| (log.level, log.body.as_str())),
            [
                (
                    Level::Info,
                    "[WarnOnStateCacheSlotProcessing] \
                     processing slots for checkpoint state (from slot: 3, to slot: 16)",
                ),
                (Level::Warn, "[WarnOnStateCacheSlotProcessing] state cache lock timed out"),
            ],
        );

        for log in logs {
            assert_eq!(log.target, "features");
        }
    });
}
