//! Users: passive packet endpoints attached to a gateway.

use strato_core::EntityId;

/// A user. Users never compute; their packets originate and terminate at
/// their gateway.
#[derive(Debug)]
pub(crate) struct UserBody {
    pub gateway: EntityId,
}
