use crate::{
    KVDEX_KEY_PREFIX,
    key::{Key, KeyPart},
};

///
/// Role
///
/// Purpose tag separating the sub-spaces of one collection.
/// Tag strings are part of the stored layout and must remain fixed.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Role {
    Id,
    PrimaryIndex,
    SecondaryIndex,
    Segment,
}

impl Role {
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Id => "__id__",
            Self::PrimaryIndex => "__index_primary__",
            Self::SecondaryIndex => "__index_secondary__",
            Self::Segment => "__segment__",
        }
    }
}

///
/// KeySpace
///
/// Deterministic key allocation for one collection:
/// `[NAMESPACE, ...collectionPath, ROLE_TAG, ...discriminators]`.
///
/// The full ancestry is part of every key, so collections that share a leaf
/// name under different parents never collide.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeySpace {
    base: Key,
}

impl KeySpace {
    #[must_use]
    pub fn new<S: AsRef<str>>(path: &[S]) -> Self {
        let mut parts = Vec::with_capacity(path.len() + 1);
        parts.push(KeyPart::from(KVDEX_KEY_PREFIX));
        parts.extend(path.iter().map(|segment| KeyPart::from(segment.as_ref())));

        Self {
            base: Key::new(parts),
        }
    }

    /// Prefix of every key the collection owns.
    #[must_use]
    pub const fn base(&self) -> &Key {
        &self.base
    }

    /// Prefix of one role sub-space.
    #[must_use]
    pub fn role(&self, role: Role) -> Key {
        self.base.child(role.tag())
    }

    #[must_use]
    pub fn id_prefix(&self) -> Key {
        self.role(Role::Id)
    }

    #[must_use]
    pub fn id_key(&self, id: &KeyPart) -> Key {
        self.role(Role::Id).child(id.clone())
    }

    #[must_use]
    pub fn primary_index_key(&self, index: &str, value: &KeyPart) -> Key {
        self.role(Role::PrimaryIndex)
            .extend([KeyPart::from(index), value.clone()])
    }

    /// Prefix shared by every document carrying `value` in secondary `index`.
    #[must_use]
    pub fn secondary_index_prefix(&self, index: &str, value: &KeyPart) -> Key {
        self.role(Role::SecondaryIndex)
            .extend([KeyPart::from(index), value.clone()])
    }

    #[must_use]
    pub fn secondary_index_key(&self, index: &str, value: &KeyPart, id: &KeyPart) -> Key {
        self.secondary_index_prefix(index, value).child(id.clone())
    }

    /// Prefix shared by every chunk of every generation of one document.
    #[must_use]
    pub fn segment_prefix(&self, id: &KeyPart) -> Key {
        self.role(Role::Segment).child(id.clone())
    }

    #[must_use]
    pub fn segment_key(&self, id: &KeyPart, generation: &str, ordinal: u32) -> Key {
        self.segment_prefix(id)
            .extend([KeyPart::from(generation), KeyPart::from(ordinal)])
    }

    /// Recover the document id from a key in the id or secondary-index space.
    #[must_use]
    pub fn document_id(key: &Key) -> Option<&KeyPart> {
        key.last()
    }
}
