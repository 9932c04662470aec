//! Tests for the registration wizard

use super::*;
use crate::api::registration::MockRegistrationApi;
use crate::availability::CheckedField;
use crate::config::AvailabilityConfig;
use crate::store::MemoryStore;
use crate::validation::ValidationResult;
use async_trait::async_trait;

fn personal() -> FormPatch {
    FormPatch::new()
        .set(Field::FirstName, "Ada")
        .set(Field::LastName, "Lovelace")
        .set(Field::Email, "ada@example.com")
}

fn address() -> FormPatch {
    FormPatch::new()
        .set(Field::StreetAddress, "12 Analytical Way")
        .set(Field::City, "Springfield")
        .set(Field::Country, "US")
        .set(Field::State, "CA")
}

fn account(username: &str) -> FormPatch {
    FormPatch::new()
        .set(Field::Username, username)
        .set(Field::Password, "Secure@Pass123")
        .set(Field::ConfirmPassword, "Secure@Pass123")
        .set(Field::AcceptTerms, true)
}

fn schema_wizard() -> Wizard {
    let mut wizard = Wizard::new();
    for step in [StepKind::Personal, StepKind::Address, StepKind::Account] {
        wizard.register_validator(step, Arc::new(SchemaValidator::new(step)));
    }
    wizard
}

fn mock_wizard(api: Arc<MockRegistrationApi>) -> Wizard {
    let (checker, _rx) = AvailabilityChecker::new(api, &AvailabilityConfig::default());
    Wizard::with_default_validators(WizardDeps {
        availability: Some(Arc::new(checker)),
        ..Default::default()
    })
}

/// Fill every step and advance to review
async fn fill_to_review(wizard: &mut Wizard) {
    wizard.update_step_data(StepKind::Personal, personal()).unwrap();
    assert!(wizard.next_step().await.moved());
    wizard.update_step_data(StepKind::Address, address()).unwrap();
    assert!(wizard.next_step().await.moved());
    wizard
        .update_step_data(StepKind::Account, account("ada_lovelace"))
        .unwrap();
    assert!(wizard.next_step().await.moved());
    assert_eq!(wizard.current_step(), StepKind::Review);
}

struct RejectAll;

#[async_trait]
impl StepValidator for RejectAll {
    async fn validate(&self, _form: &FormData) -> ValidationResult {
        ValidationResult::from_errors(vec![ValidationError::general("nope")])
    }
}

#[test]
fn test_new_wizard_starts_on_personal() {
    let wizard = Wizard::new();
    assert_eq!(wizard.current_step(), StepKind::Personal);
    assert_eq!(wizard.steps().len(), 4);
    assert!(wizard.steps().iter().all(|s| !s.completed && !s.valid));
    assert_eq!(wizard.progress(), Progress { completed: 0, total: 3 });
    assert_eq!(wizard.form_data(), FormData::default());
}

#[tokio::test]
async fn test_cannot_skip_ahead() {
    let mut wizard = schema_wizard();
    wizard.update_step_data(StepKind::Personal, personal()).unwrap();

    let outcome = wizard.go_to_step(StepKind::Account).await;
    assert_eq!(
        outcome,
        NavOutcome::Blocked(BlockReason::Unreachable {
            first_incomplete: StepKind::Address
        })
    );
    assert_eq!(wizard.current_step(), StepKind::Personal);
}

#[tokio::test]
async fn test_invalid_step_blocks_and_records_errors() {
    let mut wizard = schema_wizard();
    wizard
        .update_step_data(StepKind::Personal, FormPatch::new().set(Field::FirstName, "A1"))
        .unwrap();

    let outcome = wizard.next_step().await;
    assert_eq!(outcome, NavOutcome::Blocked(BlockReason::ValidationFailed));
    let step = wizard.step(StepKind::Personal);
    assert!(!step.valid);
    assert!(!step.completed);
    assert!(step.error_for(Field::FirstName).is_some());
    assert!(step.error_for(Field::Email).is_some());
}

#[tokio::test]
async fn test_advancing_marks_step_completed() {
    let mut wizard = schema_wizard();
    wizard.update_step_data(StepKind::Personal, personal()).unwrap();

    let outcome = wizard.next_step().await;
    assert_eq!(
        outcome,
        NavOutcome::Moved {
            from: StepKind::Personal,
            to: StepKind::Address
        }
    );
    let step = wizard.step(StepKind::Personal);
    assert!(step.completed && step.valid && !step.has_errors());
    assert_eq!(wizard.progress().percent(), 33);
}

#[tokio::test]
async fn test_back_is_unconditional() {
    let mut wizard = schema_wizard();
    wizard.update_step_data(StepKind::Personal, personal()).unwrap();
    wizard.next_step().await;

    // invalid data on the current step does not prevent going back
    wizard
        .update_step_data(StepKind::Address, FormPatch::new().set(Field::City, "1"))
        .unwrap();
    let outcome = wizard.previous_step().await;
    assert!(outcome.moved());
    assert_eq!(wizard.current_step(), StepKind::Personal);

    assert_eq!(
        wizard.previous_step().await,
        NavOutcome::Blocked(BlockReason::AtBoundary)
    );
    assert_eq!(wizard.go_to_step(StepKind::Personal).await, NavOutcome::Stayed);
}

#[tokio::test]
async fn test_step_without_validator_uses_recorded_errors() {
    let mut wizard = Wizard::new();
    wizard.create_error(
        StepKind::Personal,
        ValidationError::field(Field::FirstName, "bad"),
    );
    assert!(wizard.has_step_errors(StepKind::Personal));
    assert_eq!(
        wizard.next_step().await,
        NavOutcome::Blocked(BlockReason::ValidationFailed)
    );

    wizard.clear_step_errors(StepKind::Personal);
    assert!(wizard.next_step().await.moved());
}

#[tokio::test]
async fn test_registered_validator_overrides_default() {
    let mut wizard = schema_wizard();
    wizard.update_step_data(StepKind::Personal, personal()).unwrap();
    wizard.register_validator(StepKind::Personal, Arc::new(RejectAll));
    assert!(!wizard.next_step().await.moved());

    wizard.unregister_validator(StepKind::Personal);
    wizard.clear_step_errors(StepKind::Personal);
    assert!(wizard.next_step().await.moved());
}

#[test]
fn test_update_rejects_foreign_field() {
    let mut wizard = Wizard::new();
    let patch = FormPatch::new()
        .set(Field::FirstName, "Ada")
        .set(Field::Username, "ada_lovelace");

    let err = wizard
        .update_step_data(StepKind::Personal, patch)
        .unwrap_err();
    assert_eq!(
        err,
        WizardError::ForeignField {
            field: Field::Username,
            step: StepKind::Personal
        }
    );
    // nothing from the rejected patch was applied
    assert_eq!(wizard.form_data().first_name, "");
}

#[test]
fn test_update_rejects_wrong_kind() {
    let mut wizard = Wizard::new();
    let err = wizard
        .update_step_data(
            StepKind::Account,
            FormPatch::new().set(Field::AcceptTerms, "yes"),
        )
        .unwrap_err();
    assert!(matches!(err, WizardError::WrongKind(_)));
    assert!(!wizard.form_data().accept_terms);
}

#[test]
fn test_changing_country_clears_state() {
    let mut wizard = Wizard::new();
    wizard.update_step_data(StepKind::Address, address()).unwrap();
    assert_eq!(wizard.form_data().state, "CA");

    // same country keeps the state
    wizard.set_field(Field::Country, "US").unwrap();
    assert_eq!(wizard.form_data().state, "CA");

    wizard.set_field(Field::Country, "CA").unwrap();
    let form = wizard.form_data();
    assert_eq!(form.country, "CA");
    assert_eq!(form.state, "");
}

#[test]
fn test_field_error_helpers() {
    let mut wizard = Wizard::new();
    wizard.set_field_error(Field::Username, "first");
    wizard.set_field_error(Field::Username, "second");
    let step = wizard.step(StepKind::Account);
    assert_eq!(step.errors.len(), 1);
    assert_eq!(step.error_for(Field::Username), Some("second"));

    wizard.clear_field_error(Field::Username);
    assert!(!wizard.has_step_errors(StepKind::Account));
}

#[test]
fn test_apply_availability_ignores_stale_values() {
    let mut wizard = Wizard::new();
    wizard.set_field(Field::Username, "john_doe").unwrap();

    let taken = |value: &str| AvailabilityUpdate {
        field: CheckedField::Username,
        value: value.to_string(),
        status: AvailabilityStatus::Taken,
        message: Some(CheckedField::Username.taken_message(value)),
        error: None,
    };

    assert!(!wizard.apply_availability(&taken("john_do")));
    assert!(!wizard.has_step_errors(StepKind::Account));

    assert!(wizard.apply_availability(&taken("john_doe")));
    assert_eq!(
        wizard.step(StepKind::Account).error_for(Field::Username),
        Some("Username \"john_doe\" is already taken")
    );

    let available = AvailabilityUpdate {
        status: AvailabilityStatus::Available,
        message: None,
        ..taken("john_doe")
    };
    assert!(wizard.apply_availability(&available));
    assert!(!wizard.has_step_errors(StepKind::Account));
}

/// Mirror the screen's edit path: store the value, re-check a flagged field,
/// then hand it to the availability checker and apply what comes back.
async fn edit_checked(
    wizard: &mut Wizard,
    checker: &AvailabilityChecker,
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<AvailabilityUpdate>,
    field: Field,
    value: &str,
) {
    wizard.set_field(field, value).unwrap();
    if wizard.step(field.step()).error_for(field).is_some() {
        match schema::validate_field(field, &wizard.form_data()) {
            Some(message) => wizard.set_field_error(field, message),
            None => wizard.clear_field_error(field),
        }
    }
    checker.on_input(CheckedField::from_field(field).unwrap(), value);
    loop {
        let update = rx.recv().await.unwrap();
        if update.status != AvailabilityStatus::Checking {
            wizard.apply_availability(&update);
            return;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_availability_keeps_schema_errors_while_editing() {
    let api = Arc::new(MockRegistrationApi::default());
    let (checker, mut rx) = AvailabilityChecker::new(api, &AvailabilityConfig::default());
    let mut wizard = Wizard::new();

    // below the minimum, the checker answers Unknown without a message
    wizard.set_field(Field::Username, "adm").unwrap();
    let short = schema::validate_field(Field::Username, &wizard.form_data()).unwrap();
    wizard.set_field_error(Field::Username, short.clone());
    edit_checked(&mut wizard, &checker, &mut rx, Field::Username, "adm").await;
    assert_eq!(
        wizard.step(StepKind::Account).error_for(Field::Username),
        Some(short.as_str())
    );

    // long enough to be checked and free, but the charset is still wrong
    edit_checked(&mut wizard, &checker, &mut rx, Field::Username, "bad name!").await;
    let charset = schema::validate_field(Field::Username, &wizard.form_data()).unwrap();
    assert_eq!(
        wizard.step(StepKind::Account).error_for(Field::Username),
        Some(charset.as_str())
    );

    // a valid free name clears it
    edit_checked(&mut wizard, &checker, &mut rx, Field::Username, "good_name").await;
    assert_eq!(wizard.step(StepKind::Account).error_for(Field::Username), None);

    // a taken name is reported, and fixing it clears the message again
    edit_checked(&mut wizard, &checker, &mut rx, Field::Username, "john_doe").await;
    assert_eq!(
        wizard.step(StepKind::Account).error_for(Field::Username),
        Some("Username \"john_doe\" is already taken")
    );
    edit_checked(&mut wizard, &checker, &mut rx, Field::Username, "john_doe_2").await;
    assert_eq!(wizard.step(StepKind::Account).error_for(Field::Username), None);
}

#[test]
fn test_available_result_does_not_clear_schema_error() {
    let mut wizard = Wizard::new();
    wizard.set_field(Field::Username, "bad name!").unwrap();
    wizard.set_field_error(Field::Username, "Username can only contain letters");

    let available = AvailabilityUpdate {
        field: CheckedField::Username,
        value: "bad name!".to_string(),
        status: AvailabilityStatus::Available,
        message: None,
        error: None,
    };
    assert!(wizard.apply_availability(&available));
    assert_eq!(
        wizard.step(StepKind::Account).error_for(Field::Username),
        Some("Username can only contain letters")
    );

    let taken = AvailabilityUpdate {
        status: AvailabilityStatus::Taken,
        message: Some(CheckedField::Username.taken_message("bad name!")),
        ..available
    };
    assert!(wizard.apply_availability(&taken));
    assert_eq!(
        wizard.step(StepKind::Account).error_for(Field::Username),
        Some("Username can only contain letters")
    );
}

#[tokio::test]
async fn test_taken_username_blocks_account_step() {
    let api = Arc::new(MockRegistrationApi::default());
    let mut wizard = mock_wizard(api.clone());
    wizard.update_step_data(StepKind::Personal, personal()).unwrap();
    wizard.next_step().await;
    wizard.update_step_data(StepKind::Address, address()).unwrap();
    wizard.next_step().await;

    wizard
        .update_step_data(StepKind::Account, account("john_doe"))
        .unwrap();
    assert_eq!(
        wizard.next_step().await,
        NavOutcome::Blocked(BlockReason::ValidationFailed)
    );
    assert_eq!(
        wizard.step(StepKind::Account).error_for(Field::Username),
        Some("Username \"john_doe\" is already taken")
    );

    // too short for the schema, so no request is made
    let checks = api.username_checks();
    wizard
        .update_step_data(StepKind::Account, account("admin"))
        .unwrap();
    assert!(!wizard.next_step().await.moved());
    assert_eq!(api.username_checks(), checks);

    wizard
        .update_step_data(StepKind::Account, account("ada_lovelace"))
        .unwrap();
    assert!(wizard.next_step().await.moved());
}

#[tokio::test]
async fn test_taken_email_blocks_personal_step() {
    let api = Arc::new(MockRegistrationApi::default());
    let mut wizard = mock_wizard(api);
    wizard
        .update_step_data(
            StepKind::Personal,
            personal().set(Field::Email, "John@Example.com"),
        )
        .unwrap();
    assert!(!wizard.next_step().await.moved());
    assert_eq!(
        wizard.step(StepKind::Personal).error_for(Field::Email),
        Some("Email \"John@Example.com\" is already registered")
    );
}

#[tokio::test]
async fn test_submit_requires_review_step() {
    let api = MockRegistrationApi::default();
    let mut wizard = schema_wizard();
    let err = wizard.submit(&api).await.unwrap_err();
    assert_eq!(
        err,
        WizardError::NotOnReviewStep {
            current: StepKind::Personal
        }
    );
    assert_eq!(api.submissions(), 0);
}

#[tokio::test]
async fn test_submit_blocked_when_terms_withdrawn() {
    let api = MockRegistrationApi::default();
    let mut wizard = schema_wizard();
    fill_to_review(&mut wizard).await;
    wizard.set_field(Field::AcceptTerms, false).unwrap();

    let err = wizard.submit(&api).await.unwrap_err();
    assert_eq!(err, WizardError::Invalid { count: 1 });
    assert_eq!(wizard.alert(), Some(INVALID_FORM_ALERT));
    assert_eq!(wizard.current_step(), StepKind::Review);
    let account = wizard.step(StepKind::Account);
    assert!(!account.valid);
    assert_eq!(
        account.error_for(Field::AcceptTerms),
        Some("You must accept the terms and conditions")
    );
    assert_eq!(api.submissions(), 0);
}

#[tokio::test]
async fn test_successful_submit_resets_wizard() {
    let api = MockRegistrationApi::default();
    let drafts = DraftStore::new(Arc::new(MemoryStore::new()));
    let mut wizard = schema_wizard().with_draft_store(drafts.clone());
    fill_to_review(&mut wizard).await;
    assert!(drafts.load().unwrap().is_some());

    let created = wizard.submit(&api).await.unwrap();
    assert_eq!(created.username, "ada_lovelace");
    assert_eq!(wizard.current_step(), StepKind::Personal);
    assert_eq!(wizard.form_data(), FormData::default());
    assert_eq!(wizard.progress().completed, 0);
    assert!(wizard.alert().is_none());
    assert!(drafts.load().unwrap().is_none());
}

#[tokio::test]
async fn test_failed_submit_keeps_data() {
    let api = MockRegistrationApi::default();
    api.fail_with(Some(ApiError::network("registration", "connection refused")));
    let mut wizard = schema_wizard();
    fill_to_review(&mut wizard).await;
    let before = wizard.form_data();

    let err = wizard.submit(&api).await.unwrap_err();
    assert!(matches!(err, WizardError::Submission(_)));
    assert_eq!(wizard.current_step(), StepKind::Review);
    assert_eq!(wizard.form_data(), before);
    assert!(wizard.alert().is_some());

    wizard.dismiss_alert();
    api.fail_with(None);
    assert!(wizard.submit(&api).await.is_ok());
}

#[tokio::test]
async fn test_server_field_errors_attach_to_steps() {
    let api = MockRegistrationApi::default();
    let mut errors = std::collections::BTreeMap::new();
    errors.insert("username".to_string(), "Reserved name".to_string());
    errors.insert("unknownField".to_string(), "ignored".to_string());
    api.fail_with(Some(
        ApiError::rejected("registration", "VALIDATION_ERROR", "Invalid data")
            .with_field_errors(errors),
    ));
    let mut wizard = schema_wizard();
    fill_to_review(&mut wizard).await;

    assert!(wizard.submit(&api).await.is_err());
    assert_eq!(
        wizard.step(StepKind::Account).error_for(Field::Username),
        Some("Reserved name")
    );
}

#[tokio::test(start_paused = true)]
async fn test_submit_times_out() {
    let api = MockRegistrationApi::new(Duration::from_secs(60));
    let mut wizard = schema_wizard().with_submit_timeout(Duration::from_secs(5));
    fill_to_review(&mut wizard).await;

    let err = wizard.submit(&api).await.unwrap_err();
    match err {
        WizardError::Submission(e) => assert!(matches!(e, ApiError::Timeout { .. })),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(wizard.current_step(), StepKind::Review);
}

#[tokio::test]
async fn test_draft_restore_resumes_at_first_incomplete_step() {
    let drafts = DraftStore::new(Arc::new(MemoryStore::new()));
    let mut wizard = schema_wizard().with_draft_store(drafts.clone());
    fill_to_review(&mut wizard).await;

    let mut resumed = schema_wizard().with_draft_store(drafts);
    assert!(resumed.restore_draft());

    // credentials are never saved, so the account step must be redone
    assert_eq!(resumed.current_step(), StepKind::Account);
    assert!(resumed.step(StepKind::Personal).completed);
    assert!(resumed.step(StepKind::Address).completed);
    assert!(!resumed.step(StepKind::Account).completed);

    let form = resumed.form_data();
    assert_eq!(form.first_name, "Ada");
    assert_eq!(form.username, "ada_lovelace");
    assert!(form.password.is_empty());
    assert!(form.confirm_password.is_empty());
}

#[tokio::test]
async fn test_draft_restore_keeps_earlier_position() {
    let drafts = DraftStore::new(Arc::new(MemoryStore::new()));
    let mut wizard = schema_wizard().with_draft_store(drafts.clone());
    wizard.update_step_data(StepKind::Personal, personal()).unwrap();
    wizard.next_step().await;
    wizard.previous_step().await;

    let mut resumed = schema_wizard().with_draft_store(drafts);
    assert!(resumed.restore_draft());
    assert_eq!(resumed.current_step(), StepKind::Personal);
    assert!(resumed.step(StepKind::Personal).completed);
}

#[test]
fn test_restore_without_draft() {
    let mut wizard = Wizard::new();
    assert!(!wizard.restore_draft());

    let mut wizard = Wizard::new().with_draft_store(DraftStore::new(Arc::new(MemoryStore::new())));
    assert!(!wizard.restore_draft());
}

#[tokio::test]
async fn test_clear_form_deletes_draft() {
    let drafts = DraftStore::new(Arc::new(MemoryStore::new()));
    let mut wizard = schema_wizard().with_draft_store(drafts.clone());
    wizard.update_step_data(StepKind::Personal, personal()).unwrap();
    assert!(drafts.load().unwrap().is_some());

    wizard.clear_form();
    assert!(drafts.load().unwrap().is_none());
    assert_eq!(wizard.form_data(), FormData::default());
}
