//! Job input value object

use std::fmt;
use std::str::FromStr;

use reqwest::Url;

use crate::domain::error::InvalidPostUrl;

/// Hosts the service can download from
const ACCEPTED_HOSTS: &[&str] = &["instagram.com", "www.instagram.com", "m.instagram.com"];

/// A validated post URL to turn into a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInput {
    url: String,
    shortcode: String,
}

impl JobInput {
    /// The URL as submitted (trimmed)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post identifier extracted from the URL path
    pub fn shortcode(&self) -> &str {
        &self.shortcode
    }

    fn extract_shortcode(raw: &str) -> Option<String> {
        let url = if raw.contains("://") {
            Url::parse(raw)
        } else {
            Url::parse(&format!("https://{}", raw))
        }
        .ok()?;

        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        // Url lowercases the host on parse
        if !ACCEPTED_HOSTS.contains(&url.host_str()?) {
            return None;
        }

        let mut segments = url.path_segments()?;
        if segments.next()? != "p" {
            return None;
        }

        let code = segments.next()?;
        let valid = !code.is_empty()
            && code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| code.to_string())
    }
}

impl FromStr for JobInput {
    type Err = InvalidPostUrl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = s.trim();
        let shortcode = Self::extract_shortcode(url).ok_or_else(|| InvalidPostUrl {
            input: s.to_string(),
        })?;
        Ok(Self {
            url: url.to_string(),
            shortcode,
        })
    }
}

impl fmt::Display for JobInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_post_url() {
        let input: JobInput = "https://www.instagram.com/p/C3xYz_-12/".parse().unwrap();
        assert_eq!(input.shortcode(), "C3xYz_-12");
        assert_eq!(input.url(), "https://www.instagram.com/p/C3xYz_-12/");
    }

    #[test]
    fn parses_url_with_query_and_no_scheme() {
        let input: JobInput = "instagram.com/p/ABC123?igsh=xyz".parse().unwrap();
        assert_eq!(input.shortcode(), "ABC123");
    }

    #[test]
    fn trims_whitespace() {
        let input: JobInput = "  https://instagram.com/p/abc  ".parse().unwrap();
        assert_eq!(input.url(), "https://instagram.com/p/abc");
    }

    #[test]
    fn rejects_youtube() {
        let err = "https://youtube.com/watch?v=dQw4w9WgXcQ"
            .parse::<JobInput>()
            .unwrap_err();
        assert!(err.to_string().contains("youtube.com"));
    }

    #[test]
    fn rejects_profile_and_reel_paths() {
        assert!("https://instagram.com/someone/".parse::<JobInput>().is_err());
        assert!("https://instagram.com/reel/abc/".parse::<JobInput>().is_err());
    }

    #[test]
    fn rejects_missing_shortcode() {
        assert!("https://instagram.com/p/".parse::<JobInput>().is_err());
        assert!("".parse::<JobInput>().is_err());
    }

    #[test]
    fn accepts_uppercase_scheme_and_host_with_port() {
        let input: JobInput = "HTTPS://WWW.Instagram.com:443/p/Xy_9/?img_index=2"
            .parse()
            .unwrap();
        assert_eq!(input.shortcode(), "Xy_9");

        let input: JobInput = "http://instagram.com:8080/p/abc".parse().unwrap();
        assert_eq!(input.shortcode(), "abc");
    }

    #[test]
    fn rejects_non_web_scheme() {
        assert!("ftp://instagram.com/p/abc".parse::<JobInput>().is_err());
    }

    #[test]
    fn rejects_lookalike_host() {
        assert!("https://notinstagram.com/p/abc".parse::<JobInput>().is_err());
    }
}
