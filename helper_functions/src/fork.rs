use types::{
    capella::{beacon_state::BeaconState as CapellaBeaconState, containers::ExecutionPayloadHeader},
    config::Config,
    nonstandard::Phase,
    phase0::beacon_state::{BeaconState as Phase0BeaconState, Fork},
    preset::Preset,
};

use crate::accessors;

#[must_use]
pub fn upgrade_to_capella<P: Preset>(
    config: &Config,
    pre: Phase0BeaconState,
) -> CapellaBeaconState {
    let epoch = accessors::get_current_epoch::<P>(&pre);

    let Phase0BeaconState {
        genesis_time,
        genesis_validators_root,
        slot,
        fork,
        latest_block_header,
        block_roots,
        state_roots,
        eth1_deposit_index,
        validators,
        balances,
        previous_epoch_attestations,
        current_epoch_attestations,
        justification_bits,
        previous_justified_checkpoint,
        current_justified_checkpoint,
        finalized_checkpoint,
    } = pre;

    let fork = Fork {
        previous_version: fork.current_version,
        current_version: config.version(Phase::Capella),
        epoch,
    };

    CapellaBeaconState {
        genesis_time,
        genesis_validators_root,
        slot,
        fork,
        latest_block_header,
        block_roots,
        state_roots,
        eth1_deposit_index,
        validators,
        balances,
        previous_epoch_attestations,
        current_epoch_attestations,
        justification_bits,
        previous_justified_checkpoint,
        current_justified_checkpoint,
        finalized_checkpoint,
        // The execution layer starts with the first Capella block.
        latest_execution_payload_header: ExecutionPayloadHeader::default(),
    }
}

#[cfg(test)]
mod tests {
    use types::{phase0::primitives::H256, preset::Minimal};

    use super::*;

    #[test]
    fn upgrade_preserves_registry_and_rotates_fork() {
        let config = Config::minimal_with_capella_at(2);

        let pre = Phase0BeaconState {
            slot: 16,
            genesis_validators_root: H256::repeat_byte(7),
            fork: Fork {
                current_version: config.genesis_fork_version,
                ..Fork::default()
            },
            balances: vec![1, 2, 3].into(),
            ..Phase0BeaconState::default()
        };

        let post = upgrade_to_capella::<Minimal>(&config, pre.clone());

        assert_eq!(post.slot, pre.slot);
        assert_eq!(post.balances, pre.balances);
        assert_eq!(post.genesis_validators_root, pre.genesis_validators_root);
        assert_eq!(post.fork.previous_version, config.genesis_fork_version);
        assert_eq!(post.fork.current_version, config.capella_fork_version);
        assert_eq!(post.fork.epoch, 2);
    }
}
