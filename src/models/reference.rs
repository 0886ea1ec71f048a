//! Relationship references that arrive either as a bare id or as the
//! populated related object.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anything addressable by a UUID primary key.
pub trait Identified {
    fn id(&self) -> Uuid;
}

/// Reference to a related record.
///
/// Serialized untagged: a bare UUID string or the embedded object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(Uuid),
    Populated(T),
}

impl<T: Identified> Ref<T> {
    /// The referenced id, whichever form the reference took.
    pub fn id(&self) -> Uuid {
        match self {
            Ref::Id(id) => *id,
            Ref::Populated(value) => value.id(),
        }
    }
}

impl<T> Ref<T> {
    pub fn populated(&self) -> Option<&T> {
        match self {
            Ref::Id(_) => None,
            Ref::Populated(value) => Some(value),
        }
    }

    /// Replaces a bare id with the populated value produced by `load`.
    pub fn populate_with<F>(self, load: F) -> Ref<T>
    where
        F: FnOnce(Uuid) -> Option<T>,
    {
        match self {
            Ref::Id(id) => load(id).map(Ref::Populated).unwrap_or(Ref::Id(id)),
            populated => populated,
        }
    }
}

impl<T> From<Uuid> for Ref<T> {
    fn from(id: Uuid) -> Self {
        Ref::Id(id)
    }
}

impl Identified for super::tenant::Model {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Identified for super::event::Model {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Identified for super::user::Model {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Summary {
        id: Uuid,
        name: String,
    }

    impl Identified for Summary {
        fn id(&self) -> Uuid {
            self.id
        }
    }

    #[test]
    fn bare_id_and_populated_normalize_to_same_id() {
        let id = Uuid::new_v4();
        let bare: Ref<Summary> = serde_json::from_value(json!(id.to_string())).unwrap();
        let populated: Ref<Summary> =
            serde_json::from_value(json!({ "id": id, "name": "Expo" })).unwrap();

        assert_eq!(bare, Ref::Id(id));
        assert!(populated.populated().is_some());
        assert_eq!(bare.id(), populated.id());
    }

    #[test]
    fn populate_with_keeps_id_when_missing() {
        let id = Uuid::new_v4();
        let reference: Ref<Summary> = Ref::from(id);
        let reference = reference.populate_with(|_| None);
        assert_eq!(reference, Ref::Id(id));

        let reference: Ref<Summary> = Ref::from(id).populate_with(|id| {
            Some(Summary {
                id,
                name: "Expo".to_string(),
            })
        });
        assert_eq!(reference.populated().map(|s| s.name.as_str()), Some("Expo"));
    }
}
