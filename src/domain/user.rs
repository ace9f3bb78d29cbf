use super::UserId;
use serde::{Deserialize, Serialize};

/// A registered user as seen by the payment core.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
}

impl User {
    /// Whether `identifier` names this user, either by email or by numeric id.
    pub fn matches(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        self.email.eq_ignore_ascii_case(identifier) || identifier.parse::<UserId>() == Ok(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_email_or_id() {
        let user = User {
            id: 12,
            email: "ana@example.com".into(),
            name: "Ana".into(),
        };
        assert!(user.matches("ana@example.com"));
        assert!(user.matches(" ANA@example.com "));
        assert!(user.matches("12"));
        assert!(!user.matches("13"));
        assert!(!user.matches("bob@example.com"));
    }
}
