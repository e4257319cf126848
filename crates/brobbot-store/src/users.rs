//! User registry.
//!
//! Users are fields of one hash under the reserved key [`USERS_KEY`], which
//! sits outside the data namespace: field = user id, value = the serialized
//! user object. Name lookups scan every record and compare case-folded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::context::StoreContext;
use crate::error::StoreResult;
use crate::hash::HashStore;

/// Reserved storage key of the user hash.
pub const USERS_KEY: &str = "users";

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A chat user as seen by the bot.
///
/// Serializes as one flat object: `id`, `name`, `room`, and whatever
/// extra attributes the adapter attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Adapter-assigned identifier, unique per user.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: String,
    /// Room the user was last seen in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Free-form attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl User {
    /// A user with no attributes, named after its id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            room: None,
            attributes: Map::new(),
        }
    }

    /// Build a user from an id and an options object.
    ///
    /// `name` and `room` are taken from the options when they are strings;
    /// every other option becomes an attribute. An `id` option is ignored.
    pub fn from_options(id: impl Into<String>, options: &Map<String, Value>) -> Self {
        let mut user = Self::new(id);
        for (field, value) in options {
            match (field.as_str(), value) {
                ("id", _) => {}
                ("name", Value::String(name)) => user.name = name.clone(),
                ("room", Value::String(room)) => user.room = Some(room.clone()),
                ("name" | "room", _) => {}
                _ => {
                    user.attributes.insert(field.clone(), value.clone());
                }
            }
        }
        user
    }

    fn folded_name(&self) -> String {
        self.name.to_lowercase()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  UserRegistry
// ═══════════════════════════════════════════════════════════════════════

/// Lookup and registration of users.
#[derive(Clone)]
pub struct UserRegistry {
    users: HashStore,
}

impl UserRegistry {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            users: HashStore::reserved(ctx),
        }
    }

    /// Store `user`, replacing any record with the same id.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn upsert(&self, user: &User) -> StoreResult<()> {
        let value = serde_json::to_value(user)?;
        self.users.set(USERS_KEY, &user.id, value).await?;
        debug!(user_id = %user.id, "user stored");
        Ok(())
    }

    /// Delete the user with `id`; returns whether it existed.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> StoreResult<bool> {
        self.users.delete(USERS_KEY, id).await
    }

    /// The stored record for `id`, if any.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .get(USERS_KEY, id)
            .await?
            .and_then(|value| decode_user(id, value)))
    }

    /// Every decodable user record. Records that fail to decode are skipped.
    #[instrument(skip(self))]
    pub async fn all(&self) -> StoreResult<Vec<User>> {
        let records = self.users.get_all(USERS_KEY).await?;
        let mut users: Vec<User> = records
            .into_iter()
            .filter_map(|(id, value)| decode_user(&id, value))
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    /// The user with `id`, creating it from `options` when needed.
    ///
    /// A fresh record is written and returned if none exists, or if
    /// `options` names a room and the stored user is in a different one.
    #[instrument(skip(self, options))]
    pub async fn by_id(&self, id: &str, options: &Map<String, Value>) -> StoreResult<User> {
        let wanted_room = options.get("room").and_then(Value::as_str);
        if let Some(user) = self.get(id).await?
            && wanted_room.is_none_or(|room| user.room.as_deref() == Some(room))
        {
            return Ok(user);
        }

        let user = User::from_options(id, options);
        self.upsert(&user).await?;
        Ok(user)
    }

    /// The first user whose name equals `name`, ignoring case.
    #[instrument(skip(self))]
    pub async fn by_exact_name(&self, name: &str) -> StoreResult<Option<User>> {
        let name = name.to_lowercase();
        Ok(self
            .all()
            .await?
            .into_iter()
            .find(|user| user.folded_name() == name))
    }

    /// Every user whose name starts with `prefix`, ignoring case.
    #[instrument(skip(self))]
    pub async fn by_raw_fuzzy_name(&self, prefix: &str) -> StoreResult<Vec<User>> {
        let prefix = prefix.to_lowercase();
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|user| user.folded_name().starts_with(&prefix))
            .collect())
    }

    /// Prefix matches for `prefix`, narrowed to a single user when exactly
    /// one of them is named `prefix` verbatim.
    ///
    /// Matching is case-insensitive, the narrowing is not: `"al"` finds both
    /// "Al" and "Alice", while `"Al"` finds only "Al".
    #[instrument(skip(self))]
    pub async fn by_fuzzy_name(&self, prefix: &str) -> StoreResult<Vec<User>> {
        let mut matches = self.by_raw_fuzzy_name(prefix).await?;
        let exact: Vec<usize> = matches
            .iter()
            .enumerate()
            .filter(|(_, user)| user.name == prefix)
            .map(|(at, _)| at)
            .collect();
        if let [at] = exact[..] {
            return Ok(vec![matches.swap_remove(at)]);
        }
        Ok(matches)
    }
}

fn decode_user(id: &str, value: Value) -> Option<User> {
    match serde_json::from_value::<User>(value) {
        Ok(user) => Some(user),
        Err(err) => {
            warn!(user_id = id, %err, "skipping undecodable user record");
            None
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
