//! Event Escrow Contract
//!
//! Custodies the funds of paid, staked attendance events. A host creates an
//! event and deposits collateral, participants pay the ticket price plus a
//! refundable stake to join, attendees reclaim their stake with the event
//! code, and the host collects the remainder once the post-event delay has
//! elapsed. The contract owner can freeze a payout and seize it.

#![no_std]

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, log, token, xdr::ToXdr, Address, Bytes,
    BytesN, Env, String,
};

mod events;

pub use events::{
    EventCreated, EventFinalized, ParticipantJoined, ParticipantLeft, PaymentBlocked,
    PaymentClaimed, PaymentUnblocked, StakeClaimed,
};

/// Longest allowed event window, in seconds (24 hours).
pub const MAX_EVENT_DURATION: u64 = 86_400;

/// Delay after `end_time` before the host may collect, in seconds (24 hours).
pub const PAYOUT_DELAY: u64 = 86_400;

/// Event codes are rendered from a value in `[0, EVENT_CODE_MODULUS)`.
pub const EVENT_CODE_MODULUS: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ContractError {
    // Setup
    AlreadyInitialized = 1,
    NotInitialized = 2,

    // Access control
    Unauthorized = 3,

    // Lookup and membership
    EventNotFound = 4,
    NotParticipant = 5,
    AlreadyJoined = 6,
    AlreadyLeft = 7,

    // Timing
    StartTimeInPast = 8,
    InvalidTimeRange = 9,
    DurationTooLong = 10,
    PayoutWindowNotOpen = 11,

    // Capacity
    EventFull = 12,

    // Claims
    InvalidEventCode = 13,
    StakeAlreadyClaimed = 14,
    PaymentBlocked = 15,
    PaymentNotBlocked = 16,
    PaymentAlreadyClaimed = 17,

    // Funds
    InvalidAmount = 18,
    TransferFailed = 19,
    MathOverflow = 20,
}

/// Coarse classification of [`ContractError`] for callers that only care
/// about the failure category.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Authorization,
    Timing,
    Capacity,
    StateConflict,
    Transfer,
    Arithmetic,
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::Unauthorized => ErrorKind::Authorization,
            ContractError::StartTimeInPast
            | ContractError::InvalidTimeRange
            | ContractError::DurationTooLong
            | ContractError::PayoutWindowNotOpen => ErrorKind::Timing,
            ContractError::EventFull => ErrorKind::Capacity,
            ContractError::TransferFailed => ErrorKind::Transfer,
            ContractError::MathOverflow => ErrorKind::Arithmetic,
            ContractError::AlreadyInitialized
            | ContractError::NotInitialized
            | ContractError::EventNotFound
            | ContractError::NotParticipant
            | ContractError::AlreadyJoined
            | ContractError::AlreadyLeft
            | ContractError::InvalidEventCode
            | ContractError::StakeAlreadyClaimed
            | ContractError::PaymentBlocked
            | ContractError::PaymentNotBlocked
            | ContractError::PaymentAlreadyClaimed
            | ContractError::InvalidAmount => ErrorKind::StateConflict,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Contract-wide settings, written once by `initialize`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Privileged identity allowed to freeze and seize payouts.
    pub owner: Address,
    /// Token every price, stake and payout is denominated in.
    pub token: Address,
}

/// A hosted, time-boxed event with paid entry and refundable stakes.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Event {
    pub id: u64,
    pub host: Address,
    pub start_time: u64,
    pub end_time: u64,
    pub price: i128,
    pub stake_amount: i128,
    pub min_participants: u32,
    pub max_participants: u32,
    /// Participants currently attending (joins minus leaves).
    pub participant_count: u32,
    pub unstaked_participant_count: u32,
    /// Cumulative joins; leaving does not decrement it.
    pub total_participants_joined: u32,
    /// Set the first time attendance reaches `min_participants`, never cleared.
    pub is_finalized: bool,
    pub is_payment_blocked: bool,
    pub is_payment_claimed: bool,
    pub event_code: String,
    pub created_at: u64,
}

#[contracttype]
#[derive(Clone, Debug)]
pub enum DataKey {
    Config,
    NextEventId,
    Event(u64),
    Participant(u64, Address),
    HasLeft(u64, Address),
    StakeClaimed(u64, Address),
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct EventEscrow;

#[contractimpl]
impl EventEscrow {
    /// Initialize the contract with its owner and the token used for funds.
    pub fn initialize(env: Env, owner: Address, token: Address) -> Result<(), ContractError> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(ContractError::AlreadyInitialized);
        }

        let config = Config { owner, token };
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::NextEventId, &1u64);

        events::emit_initialized(&env, &config);

        Ok(())
    }

    /// Create a new event and lock the host's collateral.
    ///
    /// The host must have approved this contract to spend
    /// `stake_amount * max_participants / 2` of the configured token.
    ///
    /// # Arguments
    /// * `host` - Event creator (must authorize)
    /// * `start_time` - Ledger timestamp the event starts at, not in the past
    /// * `end_time` - Ledger timestamp the event ends at, at most 24h after start
    /// * `price` - Fee each participant pays to the host
    /// * `stake_amount` - Refundable collateral each participant deposits
    /// * `min_participants` - Attendance at which the event finalizes
    /// * `max_participants` - Capacity; also sizes the host collateral
    pub fn create_event(
        env: Env,
        host: Address,
        start_time: u64,
        end_time: u64,
        price: i128,
        stake_amount: i128,
        min_participants: u32,
        max_participants: u32,
    ) -> Result<u64, ContractError> {
        host.require_auth();
        let config = Self::load_config(&env)?;

        if price < 0 || stake_amount < 0 {
            return Err(ContractError::InvalidAmount);
        }

        let now = env.ledger().timestamp();
        if start_time < now {
            return Err(ContractError::StartTimeInPast);
        }
        if end_time <= start_time {
            return Err(ContractError::InvalidTimeRange);
        }
        if end_time - start_time > MAX_EVENT_DURATION {
            return Err(ContractError::DurationTooLong);
        }

        let collateral = collateral_for(stake_amount, max_participants)?;
        pull_funds(&env, &config.token, &host, collateral)?;

        let event_id: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextEventId)
            .unwrap_or(1);

        let event_code = generate_event_code(&env, &host);
        let event = Event {
            id: event_id,
            host: host.clone(),
            start_time,
            end_time,
            price,
            stake_amount,
            min_participants,
            max_participants,
            participant_count: 0,
            unstaked_participant_count: 0,
            total_participants_joined: 0,
            is_finalized: false,
            is_payment_blocked: false,
            is_payment_claimed: false,
            event_code: event_code.clone(),
            created_at: now,
        };

        env.storage()
            .persistent()
            .set(&DataKey::Event(event_id), &event);
        let next_id = event_id.checked_add(1).ok_or(ContractError::MathOverflow)?;
        env.storage()
            .instance()
            .set(&DataKey::NextEventId, &next_id);

        log!(&env, "event created", event_id, collateral);
        events::emit_event_created(
            &env,
            EventCreated {
                event_id,
                host,
                event_code,
            },
        );

        Ok(event_id)
    }

    /// Join an event, paying `price + stake_amount` into escrow.
    ///
    /// Finalizes the event the first time attendance reaches the minimum.
    pub fn join_event(env: Env, event_id: u64, participant: Address) -> Result<(), ContractError> {
        participant.require_auth();
        let config = Self::load_config(&env)?;
        let mut event = Self::load_event(&env, event_id)?;

        if event.participant_count >= event.max_participants {
            return Err(ContractError::EventFull);
        }

        let member_key = DataKey::Participant(event_id, participant.clone());
        if env.storage().persistent().has(&member_key) {
            return Err(ContractError::AlreadyJoined);
        }

        let amount = event
            .price
            .checked_add(event.stake_amount)
            .ok_or(ContractError::MathOverflow)?;
        pull_funds(&env, &config.token, &participant, amount)?;

        event.participant_count = event
            .participant_count
            .checked_add(1)
            .ok_or(ContractError::MathOverflow)?;
        event.total_participants_joined = event
            .total_participants_joined
            .checked_add(1)
            .ok_or(ContractError::MathOverflow)?;

        let finalized_now =
            !event.is_finalized && event.participant_count >= event.min_participants;
        if finalized_now {
            event.is_finalized = true;
        }

        env.storage().persistent().set(&member_key, &true);
        env.storage()
            .persistent()
            .set(&DataKey::Event(event_id), &event);

        if finalized_now {
            log!(&env, "event finalized", event_id, event.participant_count);
            events::emit_event_finalized(&env, EventFinalized { event_id });
        }
        events::emit_participant_joined(
            &env,
            ParticipantJoined {
                event_id,
                participant,
            },
        );

        Ok(())
    }

    /// Mark `participant` as having left. Callable by the host or the
    /// participant. Nothing is refunded and finalization is not undone.
    pub fn leave_event(
        env: Env,
        event_id: u64,
        caller: Address,
        participant: Address,
    ) -> Result<(), ContractError> {
        caller.require_auth();
        let mut event = Self::load_event(&env, event_id)?;

        if caller != event.host && caller != participant {
            return Err(ContractError::Unauthorized);
        }

        if !env
            .storage()
            .persistent()
            .has(&DataKey::Participant(event_id, participant.clone()))
        {
            return Err(ContractError::NotParticipant);
        }

        let left_key = DataKey::HasLeft(event_id, participant.clone());
        if env.storage().persistent().has(&left_key) {
            return Err(ContractError::AlreadyLeft);
        }

        event.participant_count = event
            .participant_count
            .checked_sub(1)
            .ok_or(ContractError::MathOverflow)?;

        env.storage().persistent().set(&left_key, &true);
        env.storage()
            .persistent()
            .set(&DataKey::Event(event_id), &event);

        events::emit_participant_left(
            &env,
            ParticipantLeft {
                event_id,
                participant,
            },
        );

        Ok(())
    }

    /// Refund `participant`'s stake. Authorized by knowledge of the event
    /// code rather than by the caller's identity; the refund always goes to
    /// `participant`, at most once.
    pub fn claim_participant_stake(
        env: Env,
        event_id: u64,
        participant: Address,
        code: String,
    ) -> Result<(), ContractError> {
        let config = Self::load_config(&env)?;
        let mut event = Self::load_event(&env, event_id)?;

        if !env
            .storage()
            .persistent()
            .has(&DataKey::Participant(event_id, participant.clone()))
        {
            return Err(ContractError::NotParticipant);
        }

        if code_digest(&env, &code) != code_digest(&env, &event.event_code) {
            return Err(ContractError::InvalidEventCode);
        }

        let claimed_key = DataKey::StakeClaimed(event_id, participant.clone());
        if env.storage().persistent().has(&claimed_key) {
            return Err(ContractError::StakeAlreadyClaimed);
        }

        push_funds(&env, &config.token, &participant, event.stake_amount)?;

        event.unstaked_participant_count = event
            .unstaked_participant_count
            .checked_add(1)
            .ok_or(ContractError::MathOverflow)?;

        env.storage().persistent().set(&claimed_key, &true);
        env.storage()
            .persistent()
            .set(&DataKey::Event(event_id), &event);

        events::emit_stake_claimed(
            &env,
            StakeClaimed {
                event_id,
                participant,
                amount: event.stake_amount,
            },
        );

        Ok(())
    }

    /// Pay the host all fees, the unclaimed stakes and their own collateral.
    ///
    /// Opens `PAYOUT_DELAY` seconds after the event ends and only while the
    /// payment is not blocked. The boundary is strict: the ledger timestamp
    /// must be greater than `end_time + PAYOUT_DELAY`, so a claim at exactly
    /// that instant fails with `PayoutWindowNotOpen`. Returns the amount paid.
    pub fn claim_host_payment(env: Env, event_id: u64) -> Result<i128, ContractError> {
        let config = Self::load_config(&env)?;
        let mut event = Self::load_event(&env, event_id)?;

        event.host.require_auth();

        let opens_at = event
            .end_time
            .checked_add(PAYOUT_DELAY)
            .ok_or(ContractError::MathOverflow)?;
        if env.ledger().timestamp() <= opens_at {
            return Err(ContractError::PayoutWindowNotOpen);
        }

        if event.is_payment_blocked {
            return Err(ContractError::PaymentBlocked);
        }

        let host = event.host.clone();
        let amount = Self::settle(&env, &config, &mut event, &host)?;

        log!(&env, "host payment claimed", event_id, amount);

        Ok(amount)
    }

    /// Freeze the host payout of an event (owner only).
    pub fn block_event_payment(env: Env, event_id: u64) -> Result<(), ContractError> {
        Self::set_payment_blocked(&env, event_id, true)?;
        events::emit_payment_blocked(&env, PaymentBlocked { event_id });
        Ok(())
    }

    /// Lift a payout freeze (owner only).
    pub fn unblock_event_payment(env: Env, event_id: u64) -> Result<(), ContractError> {
        Self::set_payment_blocked(&env, event_id, false)?;
        events::emit_payment_unblocked(&env, PaymentUnblocked { event_id });
        Ok(())
    }

    /// Seize the payout of a blocked event to the owner. Same amount the host
    /// would have received. Returns the amount paid.
    pub fn take_host_payment_by_owner(env: Env, event_id: u64) -> Result<i128, ContractError> {
        let config = Self::load_config(&env)?;
        config.owner.require_auth();

        let mut event = Self::load_event(&env, event_id)?;
        if !event.is_payment_blocked {
            return Err(ContractError::PaymentNotBlocked);
        }

        let owner = config.owner.clone();
        let amount = Self::settle(&env, &config, &mut event, &owner)?;

        log!(&env, "blocked payment seized", event_id, amount);

        Ok(amount)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Get event details.
    pub fn get_event(env: Env, event_id: u64) -> Option<Event> {
        env.storage().persistent().get(&DataKey::Event(event_id))
    }

    /// Get the owner and token set at initialization.
    pub fn get_config(env: Env) -> Option<Config> {
        env.storage().instance().get(&DataKey::Config)
    }

    /// Number of events created so far.
    pub fn event_count(env: Env) -> u64 {
        let next_id: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextEventId)
            .unwrap_or(1);
        next_id - 1
    }

    /// True once `address` has joined, even if it later left.
    pub fn is_participant(env: Env, event_id: u64, address: Address) -> bool {
        env.storage()
            .persistent()
            .has(&DataKey::Participant(event_id, address))
    }

    /// True once `address` has been marked as having left the event.
    pub fn has_left(env: Env, event_id: u64, address: Address) -> bool {
        env.storage()
            .persistent()
            .has(&DataKey::HasLeft(event_id, address))
    }

    /// True once `address` has had its stake refunded.
    pub fn has_claimed_stake(env: Env, event_id: u64, address: Address) -> bool {
        env.storage()
            .persistent()
            .has(&DataKey::StakeClaimed(event_id, address))
    }

    /// Collateral the host locked at creation.
    pub fn host_collateral(env: Env, event_id: u64) -> Result<i128, ContractError> {
        let event = Self::load_event(&env, event_id)?;
        collateral_for(event.stake_amount, event.max_participants)
    }

    /// Amount a payout would transfer if settled now.
    pub fn payout_amount(env: Env, event_id: u64) -> Result<i128, ContractError> {
        let event = Self::load_event(&env, event_id)?;
        payout_for(&event)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn load_config(env: &Env) -> Result<Config, ContractError> {
        env.storage()
            .instance()
            .get(&DataKey::Config)
            .ok_or(ContractError::NotInitialized)
    }

    fn load_event(env: &Env, event_id: u64) -> Result<Event, ContractError> {
        env.storage()
            .persistent()
            .get(&DataKey::Event(event_id))
            .ok_or(ContractError::EventNotFound)
    }

    fn set_payment_blocked(env: &Env, event_id: u64, blocked: bool) -> Result<(), ContractError> {
        let config = Self::load_config(env)?;
        config.owner.require_auth();

        let mut event = Self::load_event(env, event_id)?;
        event.is_payment_blocked = blocked;
        env.storage()
            .persistent()
            .set(&DataKey::Event(event_id), &event);

        log!(env, "payment blocked flag set", event_id, blocked);

        Ok(())
    }

    /// Transfer the event payout to `recipient` and mark it paid.
    fn settle(
        env: &Env,
        config: &Config,
        event: &mut Event,
        recipient: &Address,
    ) -> Result<i128, ContractError> {
        if event.is_payment_claimed {
            return Err(ContractError::PaymentAlreadyClaimed);
        }

        let amount = payout_for(event)?;
        push_funds(env, &config.token, recipient, amount)?;

        event.is_payment_claimed = true;
        env.storage()
            .persistent()
            .set(&DataKey::Event(event.id), &*event);

        events::emit_payment_claimed(
            env,
            PaymentClaimed {
                event_id: event.id,
                recipient: recipient.clone(),
                amount,
            },
        );

        Ok(amount)
    }
}

// ---------------------------------------------------------------------------
// Fund accounting
// ---------------------------------------------------------------------------

/// Host collateral: `stake_amount * max_participants / 2`, rounded down.
fn collateral_for(stake_amount: i128, max_participants: u32) -> Result<i128, ContractError> {
    stake_amount
        .checked_mul(i128::from(max_participants))
        .ok_or(ContractError::MathOverflow)?
        .checked_div(2)
        .ok_or(ContractError::MathOverflow)
}

/// `price * joined + stake_amount * (joined - unstaked) + collateral`
fn payout_for(event: &Event) -> Result<i128, ContractError> {
    let joined = event.total_participants_joined;
    let unclaimed = joined
        .checked_sub(event.unstaked_participant_count)
        .ok_or(ContractError::MathOverflow)?;

    let fees = event
        .price
        .checked_mul(i128::from(joined))
        .ok_or(ContractError::MathOverflow)?;
    let stakes = event
        .stake_amount
        .checked_mul(i128::from(unclaimed))
        .ok_or(ContractError::MathOverflow)?;

    fees.checked_add(stakes)
        .ok_or(ContractError::MathOverflow)?
        .checked_add(collateral_for(event.stake_amount, event.max_participants)?)
        .ok_or(ContractError::MathOverflow)
}

/// Pull `amount` from `from` into contract custody using its allowance.
fn pull_funds(env: &Env, token: &Address, from: &Address, amount: i128) -> Result<(), ContractError> {
    if amount == 0 {
        return Ok(());
    }

    let contract = env.current_contract_address();
    let token_client = token::Client::new(env, token);
    match token_client.try_transfer_from(&contract, from, &contract, &amount) {
        Ok(Ok(())) => Ok(()),
        _ => Err(ContractError::TransferFailed),
    }
}

/// Push `amount` out of contract custody to `to`.
fn push_funds(env: &Env, token: &Address, to: &Address, amount: i128) -> Result<(), ContractError> {
    if amount == 0 {
        return Ok(());
    }

    let token_client = token::Client::new(env, token);
    match token_client.try_transfer(&env.current_contract_address(), to, &amount) {
        Ok(Ok(())) => Ok(()),
        _ => Err(ContractError::TransferFailed),
    }
}

// ---------------------------------------------------------------------------
// Event codes
// ---------------------------------------------------------------------------

/// Derive the 6-digit event code from the creation timestamp and the host.
///
/// Deterministic and predictable by anyone who knows both inputs.
fn generate_event_code(env: &Env, host: &Address) -> String {
    let mut seed = Bytes::from_slice(env, &env.ledger().timestamp().to_be_bytes());
    seed.append(&host.clone().to_xdr(env));

    let digest: BytesN<32> = env.crypto().sha256(&seed).into();

    // Big-endian reduction of the 256-bit digest.
    let mut value: u64 = 0;
    for byte in digest.to_array() {
        value = (value * 256 + u64::from(byte)) % EVENT_CODE_MODULUS;
    }

    render_decimal(env, value)
}

/// Minimal-width decimal rendering, "0" for zero.
fn render_decimal(env: &Env, mut value: u64) -> String {
    let mut buf = [0u8; 20];
    let mut pos = buf.len();
    loop {
        pos -= 1;
        buf[pos] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    String::from_bytes(env, &buf[pos..])
}

fn code_digest(env: &Env, code: &String) -> BytesN<32> {
    env.crypto().sha256(&code.clone().to_xdr(env)).into()
}
