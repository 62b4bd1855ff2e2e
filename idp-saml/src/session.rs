use chrono::{DateTime, Utc};

/// Session is what an authentication hook hands back for a signed-in user.
///
/// The exchange never looks inside it; only the identity provider reads
/// the fields when it builds the assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub create_time: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
    pub index: String,
    pub name_id: String,
    pub user_name: String,
    pub user_email: String,
    pub user_common_name: String,
    pub user_surname: String,
    pub user_given_name: String,
    pub groups: Vec<String>,
}
