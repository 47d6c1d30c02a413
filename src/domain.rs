//! Query name decomposition.

/// A query name split into the part left of the registrable domain and the
/// last two labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainParts {
    pub subdomain: String,
    pub tld: String,
}

impl DomainParts {
    /// Split `labels` (root label excluded).
    ///
    /// Names with two or fewer labels yield empty parts.
    pub fn parse<S: AsRef<str>>(labels: &[S]) -> Self {
        if labels.len() <= 2 {
            return Self::default();
        }

        let split = labels.len() - 2;
        let join = |parts: &[S]| {
            parts
                .iter()
                .map(AsRef::<str>::as_ref)
                .collect::<Vec<_>>()
                .join(".")
        };

        Self {
            subdomain: join(&labels[..split]),
            tld: join(&labels[split..]),
        }
    }
}
