//! Records published for off-chain indexers, one per state transition.

use soroban_sdk::{contracttype, symbol_short, Address, Env, String};

use crate::Config;

pub fn emit_initialized(env: &Env, config: &Config) {
    env.events()
        .publish((symbol_short!("init"),), config.clone());
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventCreated {
    pub event_id: u64,
    pub host: Address,
    pub event_code: String,
}

pub fn emit_event_created(env: &Env, event: EventCreated) {
    let topics = (symbol_short!("created"), event.event_id);
    env.events().publish(topics, event);
}

/// Published once per event, when attendance first reaches the minimum.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventFinalized {
    pub event_id: u64,
}

pub fn emit_event_finalized(env: &Env, event: EventFinalized) {
    let topics = (symbol_short!("finalzd"), event.event_id);
    env.events().publish(topics, event);
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantJoined {
    pub event_id: u64,
    pub participant: Address,
}

pub fn emit_participant_joined(env: &Env, event: ParticipantJoined) {
    let topics = (symbol_short!("joined"), event.event_id);
    env.events().publish(topics, event);
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantLeft {
    pub event_id: u64,
    pub participant: Address,
}

pub fn emit_participant_left(env: &Env, event: ParticipantLeft) {
    let topics = (symbol_short!("left"), event.event_id);
    env.events().publish(topics, event);
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StakeClaimed {
    pub event_id: u64,
    pub participant: Address,
    pub amount: i128,
}

pub fn emit_stake_claimed(env: &Env, event: StakeClaimed) {
    let topics = (symbol_short!("stk_clm"), event.event_id);
    env.events().publish(topics, event);
}

/// `recipient` is the host, or the owner when a blocked payout is seized.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PaymentClaimed {
    pub event_id: u64,
    pub recipient: Address,
    pub amount: i128,
}

pub fn emit_payment_claimed(env: &Env, event: PaymentClaimed) {
    let topics = (symbol_short!("paid"), event.event_id);
    env.events().publish(topics, event);
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PaymentBlocked {
    pub event_id: u64,
}

pub fn emit_payment_blocked(env: &Env, event: PaymentBlocked) {
    let topics = (symbol_short!("blocked"), event.event_id);
    env.events().publish(topics, event);
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PaymentUnblocked {
    pub event_id: u64,
}

pub fn emit_payment_unblocked(env: &Env, event: PaymentUnblocked) {
    let topics = (symbol_short!("unblockd"), event.event_id);
    env.events().publish(topics, event);
}
