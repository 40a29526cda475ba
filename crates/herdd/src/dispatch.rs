//! Event dispatcher: routes each inbound event through the conversation
//! state machine and into the classification pipeline or the registry.
//!
//! Taxonomy errors are converted to user-facing replies here: a classifier
//! outage asks the user to retry, an ownership violation is rejected, and a
//! persistence failure becomes a generic apology while the registry stays at
//! its last durable snapshot.

use std::sync::Arc;

use herd_shared::error::HerdError;
use herd_shared::event::{ButtonAction, CommandKind, Event, Profile};
use herd_shared::model::{PhotoRef, UserId};
use tracing::{error, info, warn};

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::gate::{self, GateDecision};
use crate::identify::{self, IdentifyOutcome};
use crate::registry::Registry;
use crate::session::{ConversationState, SessionTable};
use crate::telegram::{Action, Gateway};
use crate::vision::Vision;

const MSG_MENU: &str = "What would you like to do?";
const MSG_ASK_NAME: &str = "Please enter the name of your animal. 🐄";
const MSG_ASK_PHOTO: &str = "Great! Now please send a photo of your animal. 📸";
const MSG_ASK_IDENTIFY_PHOTO: &str =
    "Please send a photo of the animal you want to identify. 🔍";
const MSG_NOT_A_CANDIDATE: &str =
    "This doesn't appear to be one of the animals I can recognize. Please try another photo. 🚫🐮";
const MSG_NOT_UNDERSTOOD: &str =
    "I'm sorry, I didn't understand that. Please use the menu options or commands. 🤔";
const MSG_EMPTY_HERD: &str = "You don't have any animals registered yet. 😢";
const MSG_REMOVED: &str = "The animal has been removed from your herd. 👋";
const MSG_NOT_YOURS: &str = "This animal doesn't belong to you or doesn't exist. 🚫";
const MSG_NO_MATCH: &str = "This animal is not in the registry. Would you like to add it? 🆕";
const MSG_NO_CONFIDENT_MATCH: &str =
    "I couldn't find a confident match. Would you like to add this animal? 🆕";
const MSG_RETRY: &str = "I couldn't analyze that photo right now. Please try again in a moment. ⏳";
const MSG_FAILURE: &str = "Something went wrong on my side. Please try again. 😿";

pub struct Dispatcher<G, V> {
    gateway: Arc<G>,
    vision: Arc<V>,
    registry: Registry,
    sessions: SessionTable,
    broadcaster: Broadcaster<G>,
    config: Arc<Config>,
}

impl<G, V> Dispatcher<G, V>
where
    G: Gateway + 'static,
    V: Vision + 'static,
{
    pub fn new(
        gateway: Arc<G>,
        vision: Arc<V>,
        registry: Registry,
        sessions: SessionTable,
        config: Arc<Config>,
    ) -> Self {
        let broadcaster = Broadcaster::new(Arc::clone(&gateway), &config.broadcast);
        Self {
            gateway,
            vision,
            registry,
            sessions,
            broadcaster,
            config,
        }
    }

    /// Handle one inbound event. Never propagates an error; whatever goes
    /// wrong is reported to the user and logged here.
    pub async fn handle(&self, event: Event) {
        let profile = event.sender().clone();
        // Create on first contact, refresh the name on every one after.
        if let Err(e) = self.registry.upsert_user(&profile.id, &profile.name).await {
            error!("Failed to record user {}: {}", profile.id, e);
            self.send_or_log(&profile.id, MSG_FAILURE).await;
            return;
        }
        let outcome = match event {
            Event::Command { kind, .. } => self.on_command(&profile, kind).await,
            Event::Text { text, .. } => self.on_text(&profile, &text).await,
            Event::Photo { photo, .. } => self.on_photo(&profile, &photo).await,
            Event::Button {
                action,
                callback_id,
                ..
            } => self.on_button(&profile, &action, &callback_id).await,
        };
        if let Err(e) = outcome {
            self.report_failure(&profile, &e).await;
        }
    }

    async fn on_command(&self, profile: &Profile, kind: CommandKind) -> Result<(), HerdError> {
        match kind {
            CommandKind::Start | CommandKind::Menu => self.send_menu(profile).await,
            CommandKind::Enroll => self.begin_enrollment(profile).await,
            CommandKind::List => self.send_herd(profile).await,
            CommandKind::Identify => {
                self.gateway
                    .send_text(&profile.id, MSG_ASK_IDENTIFY_PHOTO, &[])
                    .await
            }
        }
    }

    async fn on_text(&self, profile: &Profile, text: &str) -> Result<(), HerdError> {
        match self.sessions.state(&profile.id).await {
            ConversationState::AwaitingName => {
                self.sessions
                    .set(
                        &profile.id,
                        ConversationState::AwaitingPhoto {
                            pending_name: text.trim().to_string(),
                        },
                    )
                    .await;
                self.gateway.send_text(&profile.id, MSG_ASK_PHOTO, &[]).await
            }
            _ => {
                self.gateway
                    .send_text(&profile.id, MSG_NOT_UNDERSTOOD, &[])
                    .await
            }
        }
    }

    async fn on_photo(&self, profile: &Profile, photo: &PhotoRef) -> Result<(), HerdError> {
        let image = self.gateway.download_photo(photo).await?;

        // Stage one: does the photo plausibly depict the target species?
        let labels = self.vision.classify(&image).await?;
        if gate::assess(&labels, &self.config.vision.target_labels, self.config.vision.top_k)
            == GateDecision::NotACandidate
        {
            // Not an error; state is deliberately unchanged so an enrollment
            // in progress keeps waiting for a usable photo.
            return self
                .gateway
                .send_text(&profile.id, MSG_NOT_A_CANDIDATE, &[])
                .await;
        }

        // Stage two: which enrolled identity is it?
        let ident = self.vision.identify(&image).await?;

        match self.sessions.state(&profile.id).await {
            ConversationState::AwaitingPhoto { pending_name } => {
                self.complete_enrollment(profile, photo, &pending_name, ident)
                    .await
            }
            _ => self.report_identification(profile, ident).await,
        }
    }

    async fn complete_enrollment(
        &self,
        profile: &Profile,
        photo: &PhotoRef,
        pending_name: &str,
        ident: identify::Identification,
    ) -> Result<(), HerdError> {
        self.registry
            .enroll(&profile.id, &ident.animal_id, pending_name, photo)
            .await?;
        self.sessions.reset(&profile.id).await;
        info!(
            "User {} enrolled animal {} as {:?} (confidence {:.2})",
            profile.id, ident.animal_id, pending_name, ident.confidence
        );
        self.gateway
            .send_text(
                &profile.id,
                &format!("{} has been added to your herd! 🎉", pending_name),
                &[],
            )
            .await
    }

    async fn report_identification(
        &self,
        profile: &Profile,
        ident: identify::Identification,
    ) -> Result<(), HerdError> {
        let outcome = identify::resolve(
            ident,
            self.config.identity.confidence_threshold,
            self.config.identity.policy,
        );
        match outcome {
            IdentifyOutcome::NoMatch {
                animal_id,
                confidence,
            } => {
                info!(
                    "Identification of class {} at {:.2} fell below threshold",
                    animal_id, confidence
                );
                self.gateway
                    .send_text(&profile.id, MSG_NO_CONFIDENT_MATCH, &[])
                    .await
            }
            IdentifyOutcome::Match {
                animal_id,
                confidence,
                uncertain,
            } => match self.registry.animal(&animal_id).await {
                Some(animal) => {
                    let owner = self
                        .registry
                        .user_name(&animal.owner)
                        .await
                        .unwrap_or_else(|| "unknown".to_string());
                    let mut reply = format!(
                        "Animal identified with {:.0}% confidence!\nName: {}\nOwner: {}",
                        confidence * 100.0,
                        animal.name,
                        owner
                    );
                    if uncertain {
                        reply.push_str("\n⚠️ Low confidence - this match may be wrong.");
                    }
                    self.gateway.send_text(&profile.id, &reply, &[]).await
                }
                None => {
                    self.gateway
                        .send_text(&profile.id, MSG_NO_MATCH, &[])
                        .await
                }
            },
        }
    }

    async fn on_button(
        &self,
        profile: &Profile,
        action: &str,
        callback_id: &str,
    ) -> Result<(), HerdError> {
        // Acknowledge first so the client stops its spinner even if the
        // action itself fails.
        if let Err(e) = self.gateway.answer_callback(callback_id).await {
            warn!("Failed to answer callback {}: {}", callback_id, e);
        }
        match ButtonAction::parse(action) {
            None => {
                warn!("Ignoring unknown callback payload {:?}", action);
                Ok(())
            }
            Some(ButtonAction::Enroll) => self.begin_enrollment(profile).await,
            Some(ButtonAction::List) => self.send_herd(profile).await,
            Some(ButtonAction::Identify) => {
                self.gateway
                    .send_text(&profile.id, MSG_ASK_IDENTIFY_PHOTO, &[])
                    .await
            }
            Some(ButtonAction::Remove(animal_id)) => {
                self.registry.remove(&profile.id, &animal_id).await?;
                info!("User {} removed animal {}", profile.id, animal_id);
                self.gateway.send_text(&profile.id, MSG_REMOVED, &[]).await
            }
            Some(ButtonAction::Missing(animal_id)) => {
                let animal = self.registry.mark_missing(&profile.id, &animal_id).await?;
                let reporter = self
                    .registry
                    .user_name(&profile.id)
                    .await
                    .unwrap_or_else(|| profile.name.clone());
                let recipients = self.registry.user_ids().await;
                let report = self
                    .broadcaster
                    .broadcast(&animal_id, &animal, &reporter, recipients)
                    .await;
                if !report.failed.is_empty() {
                    warn!(
                        "Alert {} reached {} users but missed {}",
                        report.alert_id,
                        report.delivered,
                        report.failed.len()
                    );
                }
                Ok(())
            }
        }
    }

    async fn begin_enrollment(&self, profile: &Profile) -> Result<(), HerdError> {
        self.sessions
            .set(&profile.id, ConversationState::AwaitingName)
            .await;
        self.gateway.send_text(&profile.id, MSG_ASK_NAME, &[]).await
    }

    async fn send_menu(&self, profile: &Profile) -> Result<(), HerdError> {
        let actions = [
            Action::new("🐮 Add Animal", ButtonAction::Enroll.as_data()),
            Action::new("📋 My Herd", ButtonAction::List.as_data()),
            Action::new("🔍 Identify", ButtonAction::Identify.as_data()),
        ];
        self.gateway.send_text(&profile.id, MSG_MENU, &actions).await
    }

    async fn send_herd(&self, profile: &Profile) -> Result<(), HerdError> {
        let herd = self.registry.list(&profile.id).await?;
        if herd.is_empty() {
            return self.gateway.send_text(&profile.id, MSG_EMPTY_HERD, &[]).await;
        }
        for (animal_id, animal) in herd {
            let actions = [
                Action::new("🗑️ Remove", ButtonAction::Remove(animal_id.clone()).as_data()),
                Action::new(
                    "🚨 Mark as Missing",
                    ButtonAction::Missing(animal_id.clone()).as_data(),
                ),
            ];
            self.gateway
                .send_photo(
                    &profile.id,
                    &animal.photo,
                    &format!("Name: {}", animal.name),
                    &actions,
                )
                .await?;
        }
        Ok(())
    }

    async fn report_failure(&self, profile: &Profile, err: &HerdError) {
        let reply = match err {
            HerdError::ClassificationUnavailable(reason) => {
                warn!("Classification unavailable for {}: {}", profile.id, reason);
                MSG_RETRY
            }
            HerdError::Ownership { user, animal } => {
                info!("Ownership check failed: user {} on animal {}", user, animal);
                MSG_NOT_YOURS
            }
            other => {
                error!("Request from {} failed: {}", profile.id, other);
                MSG_FAILURE
            }
        };
        self.send_or_log(&profile.id, reply).await;
    }

    async fn send_or_log(&self, user: &UserId, text: &str) {
        if let Err(e) = self.gateway.send_text(user, text, &[]).await {
            warn!("Failed to reply to {}: {}", user, e);
        }
    }
}
