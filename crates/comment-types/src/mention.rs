use serde::{Deserialize, Serialize};

/// A `@user` mention or `#tag` reference found inside a rich-text comment body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct MentionRef {
    /// Display value as rendered in the document, without the trigger character.
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl MentionRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            id: None,
            email: None,
            description: None,
            url: None,
        }
    }
}

/// A user that can be mentioned with `@`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct MentionUser {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A resource that can be referenced with `#`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct MentionTag {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Mentionable users and tags supplied by the host application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionDirectory {
    #[serde(default)]
    pub users: Vec<MentionUser>,
    #[serde(default)]
    pub tags: Vec<MentionTag>,
}

impl MentionDirectory {
    pub fn new(users: Vec<MentionUser>, tags: Vec<MentionTag>) -> Self {
        Self { users, tags }
    }

    /// Users whose name or email starts with `query`, case-insensitively.
    pub fn suggest_users(&self, query: &str) -> Vec<&MentionUser> {
        let query = query.to_lowercase();
        self.users
            .iter()
            .filter(|u| {
                u.name.to_lowercase().starts_with(&query)
                    || u.email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().starts_with(&query))
            })
            .collect()
    }

    /// Tags whose label starts with `query`, case-insensitively.
    pub fn suggest_tags(&self, query: &str) -> Vec<&MentionTag> {
        let query = query.to_lowercase();
        self.tags
            .iter()
            .filter(|t| t.label.to_lowercase().starts_with(&query))
            .collect()
    }

    pub fn find_user(&self, id: &str) -> Option<&MentionUser> {
        self.users.iter().find(|u| u.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> MentionDirectory {
        MentionDirectory::new(
            vec![
                MentionUser {
                    id: "u1".into(),
                    name: "Alice".into(),
                    email: Some("alice@example.com".into()),
                },
                MentionUser {
                    id: "u2".into(),
                    name: "Bob".into(),
                    email: Some("al.bob@example.com".into()),
                },
            ],
            vec![MentionTag {
                id: "t1".into(),
                label: "Billing".into(),
                description: None,
                url: Some("/billing".into()),
            }],
        )
    }

    #[test]
    fn test_suggest_users_matches_name_or_email_prefix() {
        let dir = directory();
        let names: Vec<_> = dir.suggest_users("al").iter().map(|u| u.id.as_str()).collect();
        assert_eq!(names, vec!["u1", "u2"]);
        assert_eq!(dir.suggest_users("BO").len(), 1);
        assert!(dir.suggest_users("zed").is_empty());
    }

    #[test]
    fn test_suggest_tags_and_find_user() {
        let dir = directory();
        assert_eq!(dir.suggest_tags("bil")[0].id, "t1");
        assert_eq!(dir.find_user("u2").map(|u| u.name.as_str()), Some("Bob"));
        assert!(dir.find_user("u9").is_none());
    }
}
