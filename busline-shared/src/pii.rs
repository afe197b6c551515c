use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps rider contact data so `{:?}` and `{}` in log macros never print it.
/// Serialization still emits the real value; API responses need it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl fmt::Debug for Masked<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&mask_email(&self.0))
    }
}

impl fmt::Display for Masked<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&mask_email(&self.0))
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Masked(value)
    }
}

/// `jane.doe@example.com` -> `j*******@example.com`
fn mask_email(value: &str) -> String {
    match value.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            let hidden = local.chars().count().saturating_sub(1);
            format!("{}{}@{}", first, "*".repeat(hidden), domain)
        }
        None => "********".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_local_part() {
        let email = Masked("jane.doe@example.com".to_string());
        assert_eq!(format!("{:?}", email), "j*******@example.com");
        assert_eq!(format!("{}", Masked("not-an-email".to_string())), "********");
    }

    #[test]
    fn test_serialize_keeps_value() {
        let email = Masked("jane@example.com".to_string());
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"jane@example.com\"");
    }
}
