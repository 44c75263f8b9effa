use crate::event::{EventKind, UnknownEventKind};
use std::collections::HashSet;

/// Static allow/deny filter over event types.
///
/// Built once from configuration; read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// `None` allows every type not denied
    allow: Option<HashSet<EventKind>>,
    deny: HashSet<EventKind>,
}

impl EventFilter {
    pub fn new(allow: Option<HashSet<EventKind>>, deny: HashSet<EventKind>) -> Self {
        Self { allow, deny }
    }

    /// Parse configured type names. An empty allow list means "allow all".
    pub fn from_names<S: AsRef<str>>(allow: &[S], deny: &[S]) -> Result<Self, UnknownEventKind> {
        let allow = if allow.is_empty() {
            None
        } else {
            Some(
                allow
                    .iter()
                    .map(|s| s.as_ref().parse())
                    .collect::<Result<HashSet<_>, _>>()?,
            )
        };
        let deny = deny
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(Self { allow, deny })
    }

    pub fn allows(&self, kind: EventKind) -> bool {
        if self.deny.contains(&kind) {
            return false;
        }
        match &self.allow {
            Some(allow) => allow.contains(&kind),
            None => true,
        }
    }
}
