use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Authenticated teacher, as carried in tokens and handed to handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Teacher {
    #[schema(example = "budi")]
    pub username: String,
    #[schema(example = "Budi Santoso")]
    pub name: String,
    /// NIP
    #[schema(example = "198501012010011001")]
    pub employee_id: String,
    #[schema(example = "GURU")]
    pub role: String,
    #[schema(example = "Non-ASN")]
    pub employment_status: String,
    #[schema(example = "SMPN 1 Padarincang")]
    pub school: String,
    pub avatar: String,
}

/// One roster row. The password column holds an argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub employee_id: String,
    pub role: String,
    pub employment_status: String,
}

impl RosterEntry {
    pub fn to_teacher(&self, school: &str) -> Teacher {
        Teacher {
            username: self.username.clone(),
            name: self.name.clone(),
            employee_id: self.employee_id.clone(),
            role: self.role.clone(),
            employment_status: self.employment_status.clone(),
            school: school.to_string(),
            avatar: avatar_url(&self.name),
        }
    }
}

pub fn avatar_url(name: &str) -> String {
    reqwest::Url::parse_with_params(
        "https://ui-avatars.com/api/",
        &[("name", name), ("background", "4f46e5"), ("color", "fff")],
    )
    .map(String::from)
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_url_encodes_name() {
        assert_eq!(
            avatar_url("Budi Santoso"),
            "https://ui-avatars.com/api/?name=Budi+Santoso&background=4f46e5&color=fff"
        );
    }
}
