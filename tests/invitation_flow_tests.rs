//! Invitation lifecycle: issue, accept, expire, decline and sweep.

use anyhow::Result;
use chrono::{Duration, Utc};
use eventdesk::access::{GlobalRole, TenantRole};
use eventdesk::events::DomainEvent;
use eventdesk::invitations::{AcceptOutcome, InvitationError};
use eventdesk::repositories::{InvitationRepository, InvitationStatus, TenantRepository};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{create_tenant, create_user, setup_context};

#[tokio::test]
async fn invitation_email_carries_acceptance_link() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;

    let invitation = ctx
        .state
        .invitations
        .create(tenant.id, "Bo@Example.com", TenantRole::Editor, Some(owner.id))
        .await?;

    assert_eq!(invitation.email, "bo@example.com");
    assert_eq!(invitation.status, "pending");
    assert_eq!(invitation.token.len(), 64);

    let sent = ctx.mailer.sent_to("bo@example.com");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("Acme"));
    assert!(
        sent[0]
            .body
            .contains(&format!("https://events.test/accept-invitation?token={}", invitation.token))
    );
    Ok(())
}

#[tokio::test]
async fn failed_invitation_email_keeps_invitation() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    ctx.mailer.reject("bo@example.com");

    let invitation = ctx
        .state
        .invitations
        .create(tenant.id, "bo@example.com", TenantRole::Viewer, None)
        .await?;

    let stored = ctx.state.invitations.find_by_id(invitation.id).await?;
    assert_eq!(stored.status, "pending");
    assert!(ctx.mailer.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn registration_with_token_grants_membership() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    let invitation = ctx
        .state
        .invitations
        .create(tenant.id, "bo@example.com", TenantRole::Editor, Some(owner.id))
        .await?;

    let invitee = create_user(&ctx.db, "bo@example.com", vec![GlobalRole::User]).await?;
    let report = ctx
        .state
        .events
        .publish(DomainEvent::UserCreated {
            user_id: invitee.id,
            email: invitee.email.clone(),
            invitation_token: Some(invitation.token.clone()),
        })
        .await;
    assert!(report.failed.is_empty());

    let members = TenantRepository::new(&ctx.db)
        .list_members(tenant.id)
        .await?;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, Some(invitee.id));
    assert_eq!(members[0].role, "editor");

    let stored = ctx.state.invitations.find_by_id(invitation.id).await?;
    assert_eq!(stored.status, "accepted");
    assert!(stored.accepted_at.is_some());
    Ok(())
}

#[tokio::test]
async fn double_acceptance_is_a_no_op() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    let invitation = ctx
        .state
        .invitations
        .create(tenant.id, "bo@example.com", TenantRole::Admin, None)
        .await?;
    let invitee = create_user(&ctx.db, "bo@example.com", vec![GlobalRole::User]).await?;

    let first = ctx
        .state
        .invitations
        .accept(&invitation.token, &invitee)
        .await?;
    assert_eq!(
        first,
        AcceptOutcome::Accepted {
            tenant_id: tenant.id,
            role: TenantRole::Admin
        }
    );

    let second = ctx
        .state
        .invitations
        .accept(&invitation.token, &invitee)
        .await?;
    assert_eq!(
        second,
        AcceptOutcome::Unchanged {
            status: "accepted".to_string()
        }
    );

    let members = TenantRepository::new(&ctx.db)
        .list_members(tenant.id)
        .await?;
    assert_eq!(members.len(), 1);
    Ok(())
}

#[tokio::test]
async fn past_due_invitation_expires_on_acceptance() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    let invitation = ctx
        .state
        .invitations
        .create(tenant.id, "bo@example.com", TenantRole::Viewer, None)
        .await?;
    let invitee = create_user(&ctx.db, "bo@example.com", vec![GlobalRole::User]).await?;

    let later = Utc::now() + Duration::days(ctx.config.invitation.ttl_days + 1);
    let result = ctx
        .state
        .invitations
        .accept_at(&invitation.token, &invitee, later)
        .await;
    assert!(matches!(result, Err(InvitationError::Expired)));

    let stored = ctx.state.invitations.find_by_id(invitation.id).await?;
    assert_eq!(stored.status, "expired");
    assert!(
        TenantRepository::new(&ctx.db)
            .list_members(tenant.id)
            .await?
            .is_empty()
    );
    Ok(())
}

#[tokio::test]
async fn acceptance_requires_matching_email() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    let invitation = ctx
        .state
        .invitations
        .create(tenant.id, "bo@example.com", TenantRole::Viewer, None)
        .await?;
    let stranger = create_user(&ctx.db, "eve@example.com", vec![GlobalRole::User]).await?;

    let result = ctx
        .state
        .invitations
        .accept(&invitation.token, &stranger)
        .await;
    assert!(matches!(result, Err(InvitationError::EmailMismatch)));
    assert_eq!(
        ctx.state.invitations.find_by_id(invitation.id).await?.status,
        "pending"
    );
    Ok(())
}

#[tokio::test]
async fn declined_invitation_cannot_be_declined_again() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    let invitation = ctx
        .state
        .invitations
        .create(tenant.id, "bo@example.com", TenantRole::Viewer, None)
        .await?;

    let declined = ctx.state.invitations.decline(&invitation.token).await?;
    assert_eq!(declined.status, "declined");

    let again = ctx.state.invitations.decline(&invitation.token).await;
    assert!(matches!(again, Err(InvitationError::NotPending(status)) if status == "declined"));
    Ok(())
}

#[tokio::test]
async fn sweep_expires_only_past_due_pending() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    let invitations = &ctx.state.invitations;

    let pending = invitations
        .create(tenant.id, "a@example.com", TenantRole::Viewer, None)
        .await?;
    let declined = invitations
        .create(tenant.id, "b@example.com", TenantRole::Viewer, None)
        .await?;
    invitations.decline(&declined.token).await?;

    assert_eq!(invitations.sweep_expired(Utc::now()).await?, 0);

    let later = Utc::now() + Duration::days(30);
    assert_eq!(invitations.sweep_expired(later).await?, 1);
    assert_eq!(invitations.find_by_id(pending.id).await?.status, "expired");
    assert_eq!(invitations.find_by_id(declined.id).await?.status, "declined");
    Ok(())
}

#[tokio::test]
async fn stale_snapshot_cannot_transition_twice() -> Result<()> {
    let ctx = setup_context().await?;
    let owner = create_user(&ctx.db, "owner@example.com", vec![GlobalRole::User]).await?;
    let tenant = create_tenant(&ctx.db, &owner, "Acme").await?;
    let invitation = ctx
        .state
        .invitations
        .create(tenant.id, "bo@example.com", TenantRole::Viewer, None)
        .await?;

    // Two requests loaded the same pending row
    let repo = InvitationRepository::new(&ctx.db);
    let first = repo.find_by_id(invitation.id).await?.expect("invitation");
    let second = first.clone();

    let declined = repo.transition(first, InvitationStatus::Declined).await?;
    assert_eq!(declined.map(|row| row.status), Some("declined".to_string()));

    let accepted = repo.transition(second, InvitationStatus::Accepted).await?;
    assert!(accepted.is_none());

    let stored = ctx.state.invitations.find_by_id(invitation.id).await?;
    assert_eq!(stored.status, "declined");
    assert!(stored.accepted_at.is_none());
    Ok(())
}
