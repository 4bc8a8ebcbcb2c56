use anyhow::{Result, bail};

/// Validate a DNS-1123 label such as a namespace.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a DNS-1123 subdomain such as an object name.
/// Rules: dot-separated labels, max 253 chars overall.
pub fn validate_object_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("object name must not be empty");
    }
    if name.len() > 253 {
        bail!("object name '{}' exceeds 253 characters (got {})", name, name.len());
    }
    for label in name.split('.') {
        if label.is_empty() {
            bail!("object name '{}' contains an empty segment", name);
        }
        if label.starts_with('-') || label.ends_with('-') {
            bail!("object name '{}' has a segment starting or ending with a hyphen", name);
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            bail!(
                "object name '{}' must contain only lowercase letters, digits, '-' and '.'",
                name
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("kube-system").is_ok());
        assert!(validate_name("vc-manager").is_ok());
        assert!(validate_name("a").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("Kube-System").is_err());
        assert!(validate_name("my_ns").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("trailing-").is_err());
        assert!(validate_name("with.dot").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn object_names() {
        assert!(validate_object_name("vc-syncer-leaderelection-lock").is_ok());
        assert!(validate_object_name("lock.example.io").is_ok());
        assert!(validate_object_name("lock..io").is_err());
        assert!(validate_object_name("Lock").is_err());
        assert!(validate_object_name(&"a".repeat(254)).is_err());
    }
}
