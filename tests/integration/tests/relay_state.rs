//! RelayState tokens are consumed exactly once and expire.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use sf_trust::attributes::SimplePrincipal;
use sf_trust::{FederationError, MemoryRelayStateStore, ProtocolError, RelayStateError, RelayStateManager};

use sf_integration_tests::{Federation, IDP};

#[tokio::test]
async fn test_concurrent_responses_are_accepted_once() -> anyhow::Result<()> {
    let federation = Federation::new()?;
    let (response, _) = federation
        .login("/inbox", None, &SimplePrincipal::new("alice"))
        .await?;
    let inbound = response.to_inbound();

    let attempts = (0..8).map(|_| {
        let sp = Arc::clone(&federation.sp);
        let inbound = inbound.clone();
        tokio::spawn(async move { sp.handle_response(&inbound).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().collect::<Result<_, _>>()?;

    let accepted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].relay_target, "/inbox");
    assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
        r,
        Err(FederationError::Protocol(ProtocolError::UnknownOrReplayedResponse))
    )));
    Ok(())
}

#[tokio::test]
async fn test_tokens_are_independent() -> anyhow::Result<()> {
    let manager = RelayStateManager::new(Arc::new(MemoryRelayStateStore::new()), Duration::from_secs(60));
    let first = manager.create("_req1", "/a", IDP, None).await?;
    let second = manager.create("_req2", "/b", IDP, Some(1)).await?;
    assert_ne!(first, second);

    let record = manager.lookup_and_consume(&second).await?;
    assert_eq!(record.request_id, "_req2");
    assert_eq!(record.attribute_service_index, Some(1));

    let record = manager.lookup_and_consume(&first).await?;
    assert_eq!(record.relay_target, "/a");
    Ok(())
}

#[tokio::test]
async fn test_expired_tokens_are_swept() -> anyhow::Result<()> {
    let manager = RelayStateManager::new(Arc::new(MemoryRelayStateStore::new()), Duration::from_secs(60));
    let now = Utc::now();
    let stale = manager
        .create_at("_req1", "/", IDP, None, now - chrono::Duration::seconds(61))
        .await?;
    let fresh = manager.create_at("_req2", "/", IDP, None, now).await?;

    assert_eq!(manager.sweep_expired(now).await?, 1);
    assert!(matches!(
        manager.lookup_and_consume_at(&stale, now).await,
        Err(RelayStateError::NotFound)
    ));
    manager.lookup_and_consume_at(&fresh, now).await?;
    Ok(())
}

#[tokio::test]
async fn test_token_expires_without_sweep() -> anyhow::Result<()> {
    let manager = RelayStateManager::new(Arc::new(MemoryRelayStateStore::new()), Duration::from_secs(60));
    let now = Utc::now();
    let token = manager.create_at("_req1", "/", IDP, None, now).await?;

    let later = now + chrono::Duration::seconds(60);
    assert!(matches!(
        manager.lookup_and_consume_at(&token, later).await,
        Err(RelayStateError::NotFound)
    ));
    // The expired lookup removed the record.
    assert_eq!(manager.sweep_expired(later).await?, 0);
    Ok(())
}
