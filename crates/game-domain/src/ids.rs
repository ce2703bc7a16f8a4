//! Typed identifiers for every persisted entity class.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// A node in the hierarchical world tree (WORLD through SUBZONE).
    ChunkId
);
define_id!(
    /// A leaf room; also keys the corresponding graph node.
    SpaceId
);
define_id!(
    /// Any actor or placed object: NPC, item entity, feature, corpse.
    /// The player carries one too.
    EntityId
);
define_id!(ItemTemplateId);
define_id!(ItemInstanceId);
define_id!(QuestId);
define_id!(CorpseId);
define_id!(KnowledgeId);
