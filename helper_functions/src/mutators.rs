use anyhow::Result;
use itertools::Itertools as _;
use types::{
    config::Config,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{
    accessors::{self, get_current_epoch},
    error::Error,
    misc::compute_activation_exit_epoch,
};

pub fn balance(state: &mut impl BeaconState, validator_index: ValidatorIndex) -> Result<&mut Gwei> {
    let index = usize::try_from(validator_index)?;

    state
        .balances_mut()
        .get_mut(index)
        .ok_or_else(|| Error::ValidatorIndexOutOfBounds { validator_index }.into())
}

#[inline]
pub fn increase_balance(balance: &mut Gwei, delta: Gwei) {
    *balance += delta;
}

#[inline]
pub fn decrease_balance(balance: &mut Gwei, delta: Gwei) {
    *balance = balance.saturating_sub(delta);
}

#[must_use]
pub fn get_validator_churn_limit<P: Preset>(config: &Config, state: &impl BeaconState) -> u64 {
    let active_validator_count =
        accessors::active_validator_count(state, get_current_epoch::<P>(state));

    (active_validator_count / config.churn_limit_quotient).max(config.min_per_epoch_churn_limit)
}

pub fn initiate_validator_exit<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState,
    validator_index: ValidatorIndex,
) -> Result<()> {
    let index = usize::try_from(validator_index)?;

    let exit_epoch = state
        .validators()
        .get(index)
        .ok_or(Error::ValidatorIndexOutOfBounds { validator_index })?
        .exit_epoch;

    // > Return if validator already initiated exit
    if exit_epoch != FAR_FUTURE_EPOCH {
        return Ok(());
    }

    // > Compute exit queue epoch
    let exit_epochs = state
        .validators()
        .iter()
        .map(|validator| validator.exit_epoch)
        .filter(|epoch| *epoch != FAR_FUTURE_EPOCH)
        .collect_vec();

    let mut exit_queue_epoch = exit_epochs
        .iter()
        .copied()
        .max()
        .unwrap_or_default()
        .max(compute_activation_exit_epoch::<P>(get_current_epoch::<P>(state)));

    let exit_queue_churn = exit_epochs
        .iter()
        .filter(|epoch| **epoch == exit_queue_epoch)
        .count() as u64;

    if exit_queue_churn >= get_validator_churn_limit::<P>(config, state) {
        exit_queue_epoch += 1;
    }

    // > Set validator exit epoch and withdrawable epoch
    let validator = state
        .validators_mut()
        .get_mut(index)
        .ok_or(Error::ValidatorIndexOutOfBounds { validator_index })?;

    validator.exit_epoch = exit_queue_epoch;
    validator.withdrawable_epoch = exit_queue_epoch + P::MIN_VALIDATOR_WITHDRAWABILITY_DELAY;

    Ok(())
}

/// Slashes `slashed_index` and rewards the proposer as whistleblower.
///
/// Penalties applied at epoch boundaries are not modeled.
pub fn slash_validator<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState,
    slashed_index: ValidatorIndex,
) -> Result<()> {
    initiate_validator_exit::<P>(config, state, slashed_index)?;

    let epoch = get_current_epoch::<P>(state);
    let index = usize::try_from(slashed_index)?;

    let validator = state
        .validators_mut()
        .get_mut(index)
        .ok_or(Error::ValidatorIndexOutOfBounds {
            validator_index: slashed_index,
        })?;

    validator.slashed = true;
    validator.withdrawable_epoch = validator
        .withdrawable_epoch
        .max(epoch + P::EPOCHS_PER_SLASHINGS_VECTOR);

    let effective_balance = validator.effective_balance;

    decrease_balance(
        balance(state, slashed_index)?,
        effective_balance / P::MIN_SLASHING_PENALTY_QUOTIENT,
    );

    let proposer_index = accessors::get_beacon_proposer_index::<P>(state)?;
    let whistleblower_reward = effective_balance / P::WHISTLEBLOWER_REWARD_QUOTIENT;

    increase_balance(balance(state, proposer_index)?, whistleblower_reward);

    Ok(())
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{beacon_state::BeaconState as Phase0BeaconState, containers::Validator},
        preset::Minimal,
    };

    use super::*;

    fn state(validator_count: usize) -> Phase0BeaconState {
        let validator = Validator {
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        Phase0BeaconState {
            slot: 9,
            validators: vec![validator; validator_count].into(),
            balances: vec![Minimal::MAX_EFFECTIVE_BALANCE; validator_count].into(),
            ..Phase0BeaconState::default()
        }
    }

    #[test]
    fn exit_is_queued_after_seed_lookahead() -> Result<()> {
        let config = Config::minimal();
        let mut state = state(4);

        initiate_validator_exit::<Minimal>(&config, &mut state, 1)?;

        assert_eq!(state.validators[1].exit_epoch, 6);
        assert_eq!(state.validators[1].withdrawable_epoch, 6 + 256);

        Ok(())
    }

    #[test]
    fn exit_queue_respects_churn_limit() -> Result<()> {
        let config = Config::minimal();
        let mut state = state(4);

        for validator_index in 0..3 {
            initiate_validator_exit::<Minimal>(&config, &mut state, validator_index)?;
        }

        assert_eq!(state.validators[0].exit_epoch, 6);
        assert_eq!(state.validators[1].exit_epoch, 6);
        assert_eq!(state.validators[2].exit_epoch, 7);

        Ok(())
    }

    #[test]
    fn repeated_exit_is_a_no_op() -> Result<()> {
        let config = Config::minimal();
        let mut state = state(4);

        initiate_validator_exit::<Minimal>(&config, &mut state, 0)?;
        let exited = state.clone();
        initiate_validator_exit::<Minimal>(&config, &mut state, 0)?;

        assert_eq!(state, exited);

        Ok(())
    }

    #[test]
    fn slashing_penalizes_validator_and_rewards_proposer() -> Result<()> {
        let config = Config::minimal();
        let mut state = state(4);

        slash_validator::<Minimal>(&config, &mut state, 2)?;

        // Slot 9 is proposed by validator 1.
        assert!(state.validators[2].slashed);
        assert_eq!(
            state.balances[2],
            Minimal::MAX_EFFECTIVE_BALANCE - Minimal::MAX_EFFECTIVE_BALANCE / 128,
        );
        assert_eq!(
            state.balances[1],
            Minimal::MAX_EFFECTIVE_BALANCE + Minimal::MAX_EFFECTIVE_BALANCE / 512,
        );

        Ok(())
    }

    #[test]
    fn unknown_validator_is_an_error() {
        let mut state = state(1);

        assert!(balance(&mut state, 5).is_err());
    }
}
