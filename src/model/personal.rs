//! Consumer mail providers, used to flag domains as personal.

use std::collections::HashSet;

/// Built-in consumer mail provider domains.
pub const DEFAULT_PERSONAL_DOMAINS: &[&str] = &[
    "aol.com",
    "fastmail.com",
    "gmail.com",
    "gmx.com",
    "gmx.de",
    "gmx.net",
    "googlemail.com",
    "hey.com",
    "hotmail.co.uk",
    "hotmail.com",
    "hotmail.fr",
    "icloud.com",
    "live.com",
    "mac.com",
    "mail.com",
    "mail.ru",
    "me.com",
    "msn.com",
    "outlook.com",
    "pm.me",
    "proton.me",
    "protonmail.com",
    "tutanota.com",
    "web.de",
    "yahoo.co.uk",
    "yahoo.com",
    "yahoo.fr",
    "yandex.com",
    "yandex.ru",
    "zoho.com",
];

/// Set of domains considered personal (consumer) mail providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalProviders {
    domains: HashSet<String>,
}

impl Default for PersonalProviders {
    fn default() -> Self {
        Self {
            domains: DEFAULT_PERSONAL_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

impl PersonalProviders {
    /// The built-in set plus `extra` (lower-cased, blanks skipped).
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut providers = Self::default();
        providers.domains.extend(
            extra
                .into_iter()
                .map(|d| d.as_ref().trim().to_lowercase())
                .filter(|d| !d.is_empty()),
        );
        providers
    }

    /// Exact, case-sensitive membership; aggregation domains are already lower-case.
    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }
}
