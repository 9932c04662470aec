use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::error::ApiError;
use crate::api::registration::{RegistrationApi, RegistrationResponse};
use crate::availability::{AvailabilityChecker, AvailabilityUpdate, CheckedField};
use crate::config::Config;
use crate::draft::DraftStore;
use crate::form::{Field, StepKind};
use crate::location::{Country, LocationCache, LocationError, Lookup, Region};
use crate::ui::terminal_guard::WizardTerminal;
use crate::ui::{install_panic_hook, ScreenAction, TerminalGuard, WizardScreen};
use crate::validation::schema;
use crate::wizard::{submit_with_timeout, NavOutcome, Wizard, WizardDeps};

/// Collaborators the app is built from
pub struct AppServices {
    pub api: Arc<dyn RegistrationApi>,
    pub location: Arc<LocationCache>,
    pub drafts: Option<DraftStore>,
}

pub struct App {
    config: Config,
    wizard: Wizard,
    screen: WizardScreen,
    api: Arc<dyn RegistrationApi>,
    location: Arc<LocationCache>,
    availability: Arc<AvailabilityChecker>,
    availability_rx: mpsc::UnboundedReceiver<AvailabilityUpdate>,
    countries_task: Option<JoinHandle<Result<Lookup<Country>, LocationError>>>,
    regions_task: Option<(String, JoinHandle<Lookup<Region>>)>,
    submission: Option<JoinHandle<Result<RegistrationResponse, ApiError>>>,
    should_quit: bool,
}

impl App {
    pub fn new(config: Config, services: AppServices) -> Self {
        let (checker, availability_rx) =
            AvailabilityChecker::new(Arc::clone(&services.api), &config.availability);
        let availability = Arc::new(checker);

        let mut wizard = Wizard::with_default_validators(WizardDeps {
            availability: Some(Arc::clone(&availability)),
            location: Some(Arc::clone(&services.location)),
            email_domain_check: config.validation.email_domain_check,
        })
        .with_submit_timeout(config.submission.timeout());

        let mut screen = WizardScreen::new(&config.ui);
        if let Some(drafts) = services.drafts {
            wizard = wizard.with_draft_store(drafts);
            if wizard.restore_draft() {
                screen.set_notice("Restored your saved progress. Passwords need to be re-entered.");
            }
        }
        screen.load(&wizard);

        Self {
            config,
            wizard,
            screen,
            api: services.api,
            location: services.location,
            availability,
            availability_rx,
            countries_task: None,
            regions_task: None,
            submission: None,
            should_quit: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        install_panic_hook();
        let (_guard, mut terminal) = TerminalGuard::enter().context("failed to set up terminal")?;

        self.load_countries(false);
        self.ensure_regions();
        let result = self.event_loop(&mut terminal).await;

        self.availability.cancel_all();
        if let Some(task) = self.countries_task.take() {
            task.abort();
        }
        if let Some((_, task)) = self.regions_task.take() {
            task.abort();
        }
        if let Some(task) = self.submission.take() {
            task.abort();
        }
        result
    }

    async fn event_loop(&mut self, terminal: &mut WizardTerminal) -> Result<()> {
        let tick_rate = self.config.tick_rate();

        while !self.should_quit {
            terminal.draw(|f| self.screen.render(f, &self.wizard))?;

            if event::poll(tick_rate)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        let action = self.screen.handle_key(key, self.wizard.alert().is_some());
                        self.handle_action(action).await;
                    }
                }
            }

            self.drain_availability();
            self.poll_tasks().await;
        }
        Ok(())
    }

    async fn handle_action(&mut self, action: ScreenAction) {
        match action {
            ScreenAction::None => {}
            ScreenAction::Edited(field) => self.on_edit(field),
            ScreenAction::Next => {
                let outcome = self.wizard.next_step().await;
                self.after_navigation(outcome);
            }
            ScreenAction::Back => {
                let outcome = self.wizard.previous_step().await;
                self.after_navigation(outcome);
            }
            ScreenAction::Submit => self.start_submission().await,
            ScreenAction::CancelSubmit => self.cancel_submission(),
            ScreenAction::DismissAlert => self.wizard.dismiss_alert(),
            ScreenAction::RefreshCountries => self.load_countries(true),
            ScreenAction::ClearForm => {
                self.availability.cancel_all();
                self.wizard.clear_form();
                self.screen.load(&self.wizard);
                self.screen.set_notice("Form cleared");
            }
            ScreenAction::Quit => self.should_quit = true,
        }
    }

    fn on_edit(&mut self, field: Field) {
        let Some(value) = self.screen.field_value(field) else {
            return;
        };
        if let Err(e) = self.wizard.set_field(field, value) {
            warn!(field = %field, error = %e, "Rejected field update");
            return;
        }

        // fields already flagged are re-checked as the user fixes them
        if self.wizard.step(field.step()).error_for(field).is_some() {
            match schema::validate_field(field, &self.wizard.form_data()) {
                Some(message) => self.wizard.set_field_error(field, message),
                None => self.wizard.clear_field_error(field),
            }
        }

        if let Some(checked) = CheckedField::from_field(field) {
            let value = self.wizard.form_data().text(field).to_string();
            self.availability.on_input(checked, &value);
        }

        if field == Field::Country {
            self.screen.reload_field(Field::State, &self.wizard);
            self.ensure_regions();
        }
    }

    fn after_navigation(&mut self, outcome: NavOutcome) {
        match outcome {
            NavOutcome::Moved { from, to } => {
                debug!(from = %from, to = %to, "Step changed");
                self.screen.clear_notice();
                self.screen.load(&self.wizard);
                if to == StepKind::Address {
                    if !self.screen.countries_loaded() && self.countries_task.is_none() {
                        self.load_countries(false);
                    }
                    self.ensure_regions();
                }
            }
            NavOutcome::Blocked(reason) => {
                debug!(?reason, "Navigation blocked");
                self.screen.focus_first_error(&self.wizard);
            }
            NavOutcome::Stayed => {}
        }
    }

    fn load_countries(&mut self, force_refresh: bool) {
        // the cache itself supersedes the previous fetch
        let location = Arc::clone(&self.location);
        self.countries_task = Some(tokio::spawn(async move {
            location.get_countries(force_refresh).await
        }));
    }

    /// Fetch regions for the selected country unless they are loaded or loading
    fn ensure_regions(&mut self) {
        let country = self.wizard.form_data().country;
        if country.is_empty() || self.screen.regions_loaded_for(&country) {
            return;
        }
        if let Some((pending, task)) = &self.regions_task {
            if *pending == country {
                return;
            }
            task.abort();
        }
        let location = Arc::clone(&self.location);
        let code = country.clone();
        let task = tokio::spawn(async move { location.get_states(&code, false).await });
        self.regions_task = Some((country, task));
    }

    fn drain_availability(&mut self) {
        while let Ok(update) = self.availability_rx.try_recv() {
            self.screen.set_availability(&update);
            self.wizard.apply_availability(&update);
        }
    }

    async fn poll_tasks(&mut self) {
        if self.countries_task.as_ref().is_some_and(|t| t.is_finished()) {
            if let Some(task) = self.countries_task.take() {
                match task.await {
                    Ok(Ok(lookup)) => {
                        info!(count = lookup.items.len(), source = lookup.source.as_str(), "Countries loaded");
                        self.screen.set_countries(&lookup.items, lookup.source);
                    }
                    Ok(Err(LocationError::Superseded)) => {}
                    Ok(Err(e)) => warn!(error = %e, "Country lookup failed"),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => warn!(error = %e, "Country task failed"),
                }
            }
        }

        if self
            .regions_task
            .as_ref()
            .is_some_and(|(_, t)| t.is_finished())
        {
            if let Some((country, task)) = self.regions_task.take() {
                match task.await {
                    Ok(lookup) => self.screen.set_regions(&country, &lookup.items),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => warn!(error = %e, "Region task failed"),
                }
            }
        }

        if self.submission.as_ref().is_some_and(|t| t.is_finished()) {
            if let Some(task) = self.submission.take() {
                let outcome = match task.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(ApiError::network(self.api.name(), e.to_string())),
                };
                self.finish_submission(outcome);
            }
        }
    }

    async fn start_submission(&mut self) {
        if self.submission.is_some() {
            return;
        }
        let request = match self.wizard.prepare_submission().await {
            Ok(request) => request,
            Err(e) => {
                info!(error = %e, "Submission not started");
                return;
            }
        };
        self.availability.cancel_all();
        let api = Arc::clone(&self.api);
        let timeout = self.wizard.submit_timeout();
        self.submission = Some(tokio::spawn(async move {
            submit_with_timeout(api.as_ref(), &request, timeout).await
        }));
        self.screen.submitting = true;
    }

    fn finish_submission(&mut self, outcome: Result<RegistrationResponse, ApiError>) {
        self.screen.submitting = false;
        match self.wizard.finish_submission(outcome) {
            Ok(created) => {
                self.screen.load(&self.wizard);
                self.screen.set_notice(format!(
                    "Registration complete! Welcome, {} (account id {}).",
                    created.username, created.id
                ));
            }
            Err(_) => self.screen.load(&self.wizard),
        }
    }

    fn cancel_submission(&mut self) {
        if let Some(task) = self.submission.take() {
            task.abort();
            info!("Submission cancelled by user");
            self.wizard
                .set_alert("Submission cancelled. Your information has been kept.");
        }
        self.screen.submitting = false;
    }
}
