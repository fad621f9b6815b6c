#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use deskpilot_core::{Role, SessionConfig, SessionState, TranscriptEntry};
use proptest::prelude::*;

fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::System),
        Just(Role::User),
        Just(Role::Assistant),
        Just(Role::Tool),
    ]
}

proptest! {
    #[test]
    fn snapshot_preserves_insertion_order(
        items in proptest::collection::vec((role_strategy(), ".{0,40}"), 0..64)
    ) {
        let session = SessionState::new("prop", SessionConfig::default());
        let mut appended = Vec::with_capacity(items.len());
        for (role, content) in items {
            let entry = TranscriptEntry::new(role, content);
            session.append(entry.clone());
            appended.push(entry);
        }

        let snapshot = session.snapshot();
        prop_assert_eq!(snapshot, appended);
    }

    #[test]
    fn snapshot_is_prefix_stable(
        first in proptest::collection::vec(".{0,16}", 1..16),
        second in proptest::collection::vec(".{0,16}", 1..16)
    ) {
        let session = SessionState::new("prop", SessionConfig::default());
        for content in &first {
            session.append(TranscriptEntry::new(Role::User, content.clone()));
        }
        let before = session.snapshot();
        for content in &second {
            session.append(TranscriptEntry::new(Role::Assistant, content.clone()));
        }
        let after = session.snapshot();

        prop_assert_eq!(&after[..before.len()], &before[..]);
        prop_assert_eq!(after.len(), first.len() + second.len());
    }
}
