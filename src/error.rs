use crate::entity::Entity;

/// Errors reported by schema construction and entity operations.
///
/// Configuration problems (duplicate or unregistered kinds and signatures)
/// surface at `SchemaBuilder::freeze` or on the first operation naming the
/// offending type; lifecycle problems are local to the failing call.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    #[error("kind `{0}` is registered twice")]
    DuplicateKind(&'static str),

    #[error("signature `{0}` is registered twice")]
    DuplicateSignature(&'static str),

    #[error("kind `{0}` is not part of the schema")]
    UnregisteredKind(&'static str),

    #[error("signature `{0}` is not part of the schema")]
    UnregisteredSignature(&'static str),

    #[error("stale handle {0}: the slot has been recycled")]
    StaleHandle(Entity),

    #[error("entity {0} is already destroyed")]
    DoubleDestroy(Entity),

    #[error("component `{kind}` is not present on entity {entity}")]
    MissingComponent {
        entity: Entity,
        kind: &'static str,
    },

    #[error("entity {0} refers to a freed slot")]
    InvalidState(Entity),
}
