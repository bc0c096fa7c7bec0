// Copyright (C) 2024-2025 The Strato Project.
//
// lib.rs file belongs to the strato project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! # Strato Core
//!
//! The simulation substrate: fixed-point virtual time, the ordered event
//! queue, the entity lifecycle state machine and the reservable resource
//! primitive. Everything in here is domain-agnostic; the cloud model itself
//! lives in `strato-kernel`.

pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod resource;
pub mod rng;
pub mod time;
pub mod units;

pub use config::SimConfig;
pub use entity::{
    Claim, EntityCore, EntityId, RequestCheck, ResourceRef, ResourceSlot, StateSet, Transition,
};
pub use error::{CoreError, CoreResult};
pub use event::{
    Event, EventKind, EventQueue, EventToken, Priority, VirtualClock, SCHEDULER_PRIORITY,
    TRANSITION_PRIORITY,
};
pub use resource::Resource;
pub use rng::SimRng;
pub use time::{SimTime, TimeBase};
