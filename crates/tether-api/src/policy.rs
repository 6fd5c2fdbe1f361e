use tether_types::models::{AccountType, User};

/// Whether `sender` and `receiver` may exchange messages.
///
/// A paired account talks to exactly its partner. An open account talks to
/// any open account, and to a paired account only if that account names it
/// as partner. This one predicate gates both message creation and history
/// retrieval; a denial is an authorization failure, never a not-found.
pub fn can_exchange(sender: &User, receiver: &User) -> bool {
    match sender.account_type {
        AccountType::Paired => sender.partner_id == Some(receiver.id),
        AccountType::Open => match receiver.account_type {
            AccountType::Open => true,
            AccountType::Paired => receiver.partner_id == Some(sender.id),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(account_type: AccountType, partner_id: Option<Uuid>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "u".into(),
            display_name: "U".into(),
            avatar_url: None,
            account_type,
            partner_id,
            created_at: now,
            last_seen: now,
        }
    }

    #[test]
    fn open_accounts_exchange_freely() {
        let a = user(AccountType::Open, None);
        let b = user(AccountType::Open, None);
        assert!(can_exchange(&a, &b));
        assert!(can_exchange(&b, &a));
    }

    #[test]
    fn paired_account_only_reaches_its_partner() {
        let partner = user(AccountType::Open, None);
        let paired = user(AccountType::Paired, Some(partner.id));
        let stranger = user(AccountType::Open, None);

        assert!(can_exchange(&paired, &partner));
        assert!(!can_exchange(&paired, &stranger));
    }

    #[test]
    fn open_account_reaches_a_paired_account_only_as_its_partner() {
        let open = user(AccountType::Open, None);
        let paired_to_open = user(AccountType::Paired, Some(open.id));
        let paired_elsewhere = user(AccountType::Paired, Some(Uuid::new_v4()));

        assert!(can_exchange(&open, &paired_to_open));
        assert!(!can_exchange(&open, &paired_elsewhere));
    }

    #[test]
    fn two_paired_accounts_must_point_at_each_other() {
        let a_id = Uuid::new_v4();
        let mut a = user(AccountType::Paired, None);
        a.id = a_id;
        let b = user(AccountType::Paired, Some(a_id));
        a.partner_id = Some(b.id);

        assert!(can_exchange(&a, &b));
        assert!(can_exchange(&b, &a));

        let c = user(AccountType::Paired, Some(Uuid::new_v4()));
        assert!(!can_exchange(&a, &c));
        assert!(!can_exchange(&c, &a));
    }
}
