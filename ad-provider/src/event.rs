//! Asynchronous outcomes reported by backends
//!
//! Backends push [`ProviderEvent`]s through a [`ProviderEventSink`]. The sink is a
//! channel sender, so it can be used from whatever thread a backend's native SDK
//! calls back on; the mediator drains the channel on its own tick.
//!
//! Every report carries the identity of the request it answers: a [`LoadId`] for
//! loads and a [`CompletionId`] for shows. The mediator drops reports whose request
//! is no longer current, such as outcomes arriving after teardown.

use crossbeam::channel::{self, Receiver, Sender};

use callback_scheduler::CompletionId;

use crate::types::AdFormat;

/// Result of a rewarded show
///
/// A video can play to the screen and still withhold the reward, for example
/// when the user skips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardOutcome {
    pub displayed: bool,
    pub granted: bool,
}

impl RewardOutcome {
    /// Played and earned the reward
    pub fn granted() -> Self {
        Self {
            displayed: true,
            granted: true,
        }
    }

    /// Played without earning the reward
    pub fn declined() -> Self {
        Self {
            displayed: true,
            granted: false,
        }
    }

    /// Never reached the screen
    pub fn not_shown() -> Self {
        Self {
            displayed: false,
            granted: false,
        }
    }
}

/// Definitive outcome of a show request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    /// Banner or interstitial: whether the ad was displayed
    Displayed(bool),
    /// Rewarded: whether the reward was earned
    Reward(RewardOutcome),
}

impl ShowOutcome {
    /// The failed outcome appropriate for `format`
    pub fn not_shown(format: AdFormat) -> Self {
        match format {
            AdFormat::Rewarded => ShowOutcome::Reward(RewardOutcome::not_shown()),
            AdFormat::Banner | AdFormat::Interstitial => ShowOutcome::Displayed(false),
        }
    }

    /// The boolean handed to the application callback
    pub fn succeeded(&self) -> bool {
        match self {
            ShowOutcome::Displayed(displayed) => *displayed,
            ShowOutcome::Reward(reward) => reward.displayed && reward.granted,
        }
    }

    /// Whether the ad reached the screen, whatever became of the reward
    pub fn displayed(&self) -> bool {
        match self {
            ShowOutcome::Displayed(displayed) => *displayed,
            ShowOutcome::Reward(reward) => reward.displayed,
        }
    }
}

/// Identity of one load request
///
/// Unique per format for the life of a mediator; a new id is issued for every
/// load attempt, including automatic retries and reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadId(u64);

impl LoadId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LoadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load-{}", self.0)
    }
}

/// Notifications from a backend to the mediator
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    LoadSucceeded {
        id: LoadId,
        format: AdFormat,
    },
    LoadFailed {
        id: LoadId,
        format: AdFormat,
        reason: String,
    },
    ShowFinished {
        id: CompletionId,
        format: AdFormat,
        outcome: ShowOutcome,
    },
}

impl ProviderEvent {
    pub fn format(&self) -> AdFormat {
        match self {
            ProviderEvent::LoadSucceeded { format, .. }
            | ProviderEvent::LoadFailed { format, .. }
            | ProviderEvent::ShowFinished { format, .. } => *format,
        }
    }
}

/// Sending half of the backend event channel
///
/// Sends after the receiving mediator is gone are dropped silently.
#[derive(Debug, Clone)]
pub struct ProviderEventSink {
    tx: Sender<ProviderEvent>,
}

impl ProviderEventSink {
    /// Create a sink and the receiver the mediator drains
    pub fn channel() -> (Self, Receiver<ProviderEvent>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: ProviderEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Provider event dropped: mediator is gone");
        }
    }
}

/// Single-use token for reporting a load outcome
///
/// `succeed` and `fail` consume the ticket. A ticket dropped without reporting
/// reports a failed load, so a load never stays in flight because a backend
/// forgot it. Reports for a ticket the mediator no longer waits on are ignored.
#[derive(Debug)]
pub struct LoadTicket {
    id: LoadId,
    format: AdFormat,
    sink: ProviderEventSink,
    reported: bool,
}

impl LoadTicket {
    pub fn new(id: LoadId, format: AdFormat, sink: ProviderEventSink) -> Self {
        Self {
            id,
            format,
            sink,
            reported: false,
        }
    }

    pub fn id(&self) -> LoadId {
        self.id
    }

    pub fn format(&self) -> AdFormat {
        self.format
    }

    /// Report a filled load
    pub fn succeed(mut self) {
        self.reported = true;
        self.sink.send(ProviderEvent::LoadSucceeded {
            id: self.id,
            format: self.format,
        });
    }

    /// Report a failed load
    pub fn fail(mut self, reason: impl Into<String>) {
        self.report_failure(reason.into());
    }

    /// Retire a ticket whose load continues under a newer ticket; reports nothing
    pub fn supersede(mut self) {
        self.reported = true;
    }

    fn report_failure(&mut self, reason: String) {
        self.reported = true;
        self.sink.send(ProviderEvent::LoadFailed {
            id: self.id,
            format: self.format,
            reason,
        });
    }
}

impl Drop for LoadTicket {
    fn drop(&mut self) {
        if !self.reported {
            tracing::debug!("{} for {} dropped unreported", self.id, self.format);
            self.report_failure("load abandoned by backend".to_string());
        }
    }
}

/// Single-use token for reporting a show outcome
///
/// `finish` consumes the token. A token dropped without finishing reports the
/// failed outcome for its format, so every show resolves.
#[derive(Debug)]
pub struct ShowCompletion {
    id: CompletionId,
    format: AdFormat,
    sink: ProviderEventSink,
    finished: bool,
}

impl ShowCompletion {
    pub fn new(id: CompletionId, format: AdFormat, sink: ProviderEventSink) -> Self {
        Self {
            id,
            format,
            sink,
            finished: false,
        }
    }

    pub fn id(&self) -> CompletionId {
        self.id
    }

    pub fn format(&self) -> AdFormat {
        self.format
    }

    /// Report the outcome
    pub fn finish(mut self, outcome: ShowOutcome) {
        self.report(outcome);
    }

    /// Report the failed outcome for this format
    pub fn fail(self) {
        let outcome = ShowOutcome::not_shown(self.format);
        self.finish(outcome);
    }

    fn report(&mut self, outcome: ShowOutcome) {
        self.finished = true;
        self.sink.send(ProviderEvent::ShowFinished {
            id: self.id,
            format: self.format,
            outcome,
        });
    }
}

impl Drop for ShowCompletion {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                "Show completion {} for {} dropped unfinished, reporting failure",
                self.id,
                self.format
            );
            self.report(ShowOutcome::not_shown(self.format));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success_mapping() {
        assert!(ShowOutcome::Displayed(true).succeeded());
        assert!(!ShowOutcome::Displayed(false).succeeded());
        assert!(ShowOutcome::Reward(RewardOutcome::granted()).succeeded());
        assert_eq!(
            ShowOutcome::not_shown(AdFormat::Rewarded),
            ShowOutcome::Reward(RewardOutcome::not_shown())
        );
        assert_eq!(
            ShowOutcome::not_shown(AdFormat::Interstitial),
            ShowOutcome::Displayed(false)
        );
    }

    #[test]
    fn test_finish_reports_exactly_once() {
        let (sink, rx) = ProviderEventSink::channel();
        let completion = ShowCompletion::new(CompletionId::new(4), AdFormat::Interstitial, sink);

        completion.finish(ShowOutcome::Displayed(true));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![ProviderEvent::ShowFinished {
                id: CompletionId::new(4),
                format: AdFormat::Interstitial,
                outcome: ShowOutcome::Displayed(true),
            }]
        );
    }

    #[test]
    fn test_dropped_completion_reports_failure() {
        let (sink, rx) = ProviderEventSink::channel();
        drop(ShowCompletion::new(CompletionId::new(9), AdFormat::Rewarded, sink));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].format(), AdFormat::Rewarded);
        assert!(matches!(
            events[0],
            ProviderEvent::ShowFinished {
                outcome: ShowOutcome::Reward(RewardOutcome {
                    displayed: false,
                    granted: false
                }),
                ..
            }
        ));
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (sink, rx) = ProviderEventSink::channel();
        drop(rx);
        LoadTicket::new(LoadId::new(1), AdFormat::Banner, sink.clone()).succeed();
        LoadTicket::new(LoadId::new(2), AdFormat::Banner, sink).fail("gone");
    }

    #[test]
    fn test_declined_reward_was_still_displayed() {
        let declined = ShowOutcome::Reward(RewardOutcome::declined());
        assert!(declined.displayed());
        assert!(!declined.succeeded());

        let not_shown = ShowOutcome::not_shown(AdFormat::Rewarded);
        assert!(!not_shown.displayed());
        assert_ne!(declined, not_shown);
    }

    #[test]
    fn test_load_ticket_reports_its_id() {
        let (sink, rx) = ProviderEventSink::channel();
        LoadTicket::new(LoadId::new(7), AdFormat::Rewarded, sink.clone()).succeed();
        LoadTicket::new(LoadId::new(8), AdFormat::Banner, sink).fail("no fill");

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ProviderEvent::LoadSucceeded {
                    id: LoadId::new(7),
                    format: AdFormat::Rewarded
                },
                ProviderEvent::LoadFailed {
                    id: LoadId::new(8),
                    format: AdFormat::Banner,
                    reason: "no fill".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_dropped_load_ticket_reports_failure_once() {
        let (sink, rx) = ProviderEventSink::channel();
        drop(LoadTicket::new(LoadId::new(3), AdFormat::Interstitial, sink));

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(
            events.as_slice(),
            [ProviderEvent::LoadFailed { id, .. }] if *id == LoadId::new(3)
        ));
    }
}
