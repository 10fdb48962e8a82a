//! OS image selection
//!
//! Server records carry an internal `initial_os` token so the same record
//! shape works across providers; this module maps those tokens to
//! DigitalOcean image slugs.

/// Baseline image used when a token is unmapped or absent
pub const DEFAULT_IMAGE: &str = "ubuntu-22-04-x64";

/// Map an internal OS token to a DigitalOcean image slug
pub fn image_for(initial_os: Option<&str>) -> &'static str {
    match initial_os {
        Some("ubuntu2404lts") => "ubuntu-24-04-x64",
        Some("ubuntu2204lts") => "ubuntu-22-04-x64",
        Some("ubuntu2004lts") => "ubuntu-20-04-x64",
        Some("debian12") => "debian-12-x64",
        Some("debian11") => "debian-11-x64",
        Some("rockylinux9") => "rockylinux-9-x64",
        Some("almalinux9") => "almalinux-9-x64",
        _ => DEFAULT_IMAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tokens() {
        assert_eq!(image_for(Some("ubuntu2404lts")), "ubuntu-24-04-x64");
        assert_eq!(image_for(Some("debian12")), "debian-12-x64");
    }

    #[test]
    fn test_unmapped_token_falls_back_to_baseline() {
        assert_eq!(image_for(Some("windows-server")), DEFAULT_IMAGE);
        assert_eq!(image_for(None), DEFAULT_IMAGE);
    }
}
