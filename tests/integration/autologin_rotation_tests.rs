use crate::test_utils::{Browser, Harness, ALICE, BOB, PASSWORD};
use async_trait::async_trait;
use autologin_common::{SessionSnapshot, UserId};
use autologin_lib::{
    auth::{AuthOptions, CookieJar, CookieTransport, MemorySession, SessionState},
    AuthError, Clock, MemoryTokenStore, TokenStore,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Barrier;

/// Swap one base64url character for another, changing the sealed bytes
fn tamper(value: &str, index: usize) -> String {
    let mut chars: Vec<char> = value.chars().collect();
    chars[index] = if chars[index] == 'A' { 'B' } else { 'A' };
    chars.into_iter().collect()
}

#[tokio::test]
async fn test_rotation_invalidates_previous_token() {
    let h = Harness::new();
    let browser = Browser::new();
    h.login(&browser, "alice", PASSWORD, true).await.unwrap();
    let (user, first_hash) = h.stored_hash(&browser).unwrap();
    assert_eq!(user, ALICE);
    assert!(h.tokens.exists(ALICE, &first_hash).await.unwrap());

    let returning = browser.restarted();
    assert!(h.visit(&returning).await);

    let (_, second_hash) = h.stored_hash(&returning).unwrap();
    assert_ne!(first_hash, second_hash);
    assert!(!h.tokens.exists(ALICE, &first_hash).await.unwrap());
    assert!(h.tokens.exists(ALICE, &second_hash).await.unwrap());
    assert_eq!(h.tokens.count_for(ALICE), 1);
}

#[tokio::test]
async fn test_every_autologin_rotates() {
    let h = Harness::new();
    let browser = Browser::new();
    h.login(&browser, "alice", PASSWORD, true).await.unwrap();

    let mut seen = vec![h.remember_cookie(&browser).unwrap()];
    let mut current = browser;
    for _ in 0..5 {
        current = current.restarted();
        assert!(h.visit(&current).await);
        let cookie = h.remember_cookie(&current).unwrap();
        assert!(!seen.contains(&cookie));
        seen.push(cookie);
    }
    assert_eq!(h.tokens.count_for(ALICE), 1);
}

#[tokio::test]
async fn test_replayed_token_is_rejected_without_side_effects() {
    let h = Harness::new();
    let browser = Browser::new();
    h.login(&browser, "alice", PASSWORD, true).await.unwrap();

    // An attacker copies the cookie, then the owner comes back first
    let stolen = browser.restarted();
    assert!(h.visit(&browser.restarted()).await);
    let rows_before = h.tokens.records();

    let session = MemorySession::new();
    let jar = CookieJar::new().with_cookie("autologin", &h.remember_cookie(&stolen).unwrap());
    let request = h.auth.request(&session, &jar);
    assert!(!request.autologin().await);

    assert!(!request.loggedin().await);
    assert_eq!(session.snapshot().await, SessionSnapshot::logged_out());
    assert!(jar.pending().is_empty());
    assert_eq!(h.tokens.records(), rows_before);
}

#[tokio::test]
async fn test_missing_or_tampered_cookie_is_not_logged_in() {
    let h = Harness::new();
    let browser = Browser::new();
    h.login(&browser, "alice", PASSWORD, true).await.unwrap();
    let cookie = h.remember_cookie(&browser).unwrap();

    assert!(!h.visit(&Browser::new()).await);

    for index in [0, cookie.len() / 2, cookie.len() - 1] {
        let tampered = Browser::new();
        tampered.set_cookie("autologin", &tamper(&cookie, index));
        assert!(!h.visit(&tampered).await);
        // The bad cookie is left alone rather than answered
        assert!(h.remember_cookie(&tampered).is_some());
    }
    assert_eq!(h.tokens.count_for(ALICE), 1);
}

#[tokio::test]
async fn test_autologin_refuses_inactive_or_deleted_user() {
    let h = Harness::new();
    let browser = Browser::new();
    h.login(&browser, "alice", PASSWORD, true).await.unwrap();

    h.users.set_activated(ALICE, false);
    assert!(!h.visit(&browser.restarted()).await);
    assert_eq!(h.tokens.count_for(ALICE), 1);

    h.users.set_activated(ALICE, true);
    h.users.remove(ALICE);
    assert!(!h.visit(&browser.restarted()).await);
    assert_eq!(h.tokens.count_for(ALICE), 1);
    assert_eq!(h.tokens.count_for(BOB), 0);
}

#[tokio::test]
async fn test_forged_user_id_does_not_log_in() {
    let h = Harness::new();
    let browser = Browser::new();
    h.login(&browser, "alice", PASSWORD, true).await.unwrap();
    let payload = h.payload(&browser).unwrap();

    // Alice's token presented under Bob's id
    let forged = h
        .auth
        .codec()
        .encode(&autologin_common::CookiePayload {
            id: BOB,
            key: payload.key,
        })
        .unwrap();
    let attacker = Browser::new();
    attacker.set_cookie("autologin", &forged);
    assert!(!h.visit(&attacker).await);
}

#[tokio::test]
async fn test_clean_expires_old_grants() {
    let h = Harness::new();
    let browser = Browser::new();
    h.login(&browser, "alice", PASSWORD, true).await.unwrap();

    h.clock.advance(Duration::days(61));
    assert_eq!(h.auth.clean_expired().await.unwrap(), 1);
    assert!(!h.visit(&browser.restarted()).await);
}

#[tokio::test]
async fn test_rotation_extends_grant_lifetime() {
    let h = Harness::new();
    let browser = Browser::new();
    h.login(&browser, "alice", PASSWORD, true).await.unwrap();

    h.clock.advance(Duration::days(40));
    let returning = browser.restarted();
    assert!(h.visit(&returning).await);

    h.clock.advance(Duration::days(40));
    assert_eq!(h.auth.clean_expired().await.unwrap(), 0);
    assert!(h.visit(&returning.restarted()).await);
}

#[tokio::test]
async fn test_login_sweeps_expired_grants_of_everyone() {
    let h = Harness::with_options(AuthOptions {
        purge_on_login: false,
        ..AuthOptions::default()
    });
    let old = Browser::new();
    h.login(&old, "alice", PASSWORD, true).await.unwrap();
    h.tokens.insert(UserId(99), "orphan").await.unwrap();

    h.clock.advance(Duration::days(90));
    h.login(&Browser::new(), "alice", PASSWORD, true).await.unwrap();

    assert_eq!(h.tokens.len(), 1);
    assert!(!h.visit(&old.restarted()).await);
}

#[tokio::test]
async fn test_clean_cutoff_is_inclusive() {
    let h = Harness::new();
    h.tokens.insert(ALICE, "before").await.unwrap();
    h.clock.advance(Duration::seconds(1));
    let cutoff = h.clock.now();
    h.tokens.insert(ALICE, "at").await.unwrap();
    h.clock.advance(Duration::seconds(1));
    h.tokens.insert(ALICE, "after").await.unwrap();

    assert_eq!(h.tokens.clean(cutoff).await.unwrap(), 1);
    assert!(!h.tokens.exists(ALICE, "before").await.unwrap());
    assert!(h.tokens.exists(ALICE, "at").await.unwrap());
    assert!(h.tokens.exists(ALICE, "after").await.unwrap());
}

/// Holds every `update` until two of them are in flight, so both racing
/// requests have already passed `exists` before either rotates.
struct RaceGate {
    inner: MemoryTokenStore,
    barrier: Barrier,
}

#[async_trait]
impl TokenStore for RaceGate {
    async fn insert(&self, user: UserId, token_hash: &str) -> Result<(), AuthError> {
        self.inner.insert(user, token_hash).await
    }
    async fn exists(&self, user: UserId, token_hash: &str) -> Result<bool, AuthError> {
        self.inner.exists(user, token_hash).await
    }
    async fn update(&self, user: UserId, old: &str, new: &str) -> Result<bool, AuthError> {
        self.barrier.wait().await;
        self.inner.update(user, old, new).await
    }
    async fn delete(&self, user: UserId, token_hash: &str) -> Result<(), AuthError> {
        self.inner.delete(user, token_hash).await
    }
    async fn purge(&self, user: UserId) -> Result<(), AuthError> {
        self.inner.purge(user).await
    }
    async fn clean(&self, cutoff: DateTime<Utc>) -> Result<usize, AuthError> {
        self.inner.clean(cutoff).await
    }
}

#[tokio::test]
async fn test_concurrent_autologin_rotates_once() {
    let h = Harness::build(AuthOptions::default(), |tokens| {
        Arc::new(RaceGate {
            inner: tokens,
            barrier: Barrier::new(2),
        }) as Arc<dyn TokenStore>
    });

    // Mint directly: the gate only lets updates through in pairs
    let browser = Browser::new();
    let jar = browser.jar();
    h.auth
        .request(browser.session(), &jar)
        .create_autologin(ALICE)
        .await
        .unwrap();
    browser.absorb(&jar);
    let cookie = h.remember_cookie(&browser).unwrap();

    let (first_session, second_session) = (MemorySession::new(), MemorySession::new());
    let first_jar = CookieJar::new().with_cookie("autologin", &cookie);
    let second_jar = CookieJar::new().with_cookie("autologin", &cookie);
    let first = h.auth.request(&first_session, &first_jar);
    let second = h.auth.request(&second_session, &second_jar);

    let (a, b) = tokio::join!(first.autologin(), second.autologin());

    // Both requests are logged in for now
    assert!(a && b);
    assert!(first.loggedin().await && second.loggedin().await);

    // Exactly one of them rotated and handed out a new cookie
    let rotated: Vec<String> = [&first_jar, &second_jar]
        .iter()
        .filter_map(|jar| jar.pending_for("autologin"))
        .map(|write| write.value)
        .collect();
    assert_eq!(rotated.len(), 1);
    assert_eq!(h.tokens.count_for(ALICE), 1);

    // The loser still holds the old cookie, which no longer works
    let loser = if first_jar.pending().is_empty() { &first_jar } else { &second_jar };
    assert_eq!(loser.get_cookie("autologin").as_deref(), Some(cookie.as_str()));
    let stale = Browser::new();
    stale.set_cookie("autologin", &cookie);
    let stale_jar = stale.jar();
    assert!(!h.auth.request(stale.session(), &stale_jar).autologin().await);
}
