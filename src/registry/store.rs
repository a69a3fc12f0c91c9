//! Registry implementation
//!
//! The registry owns every [`Publication`] by name. Producers get a handle
//! from [`Registry::publish`], consumers attach their subscription with
//! [`Registry::subscribe`]. Entries live until the stream is stopped and
//! nobody is attached or waiting.
//!
//! Lock order is always publication before subscription. Registry methods
//! release a subscription before locking another publication.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::auth::{AllowAll, Authorizer};
use super::config::RegistryConfig;
use super::name::StreamName;
use crate::error::{Error, Result};
use crate::media::MediaFormat;
use crate::publication::{Publication, SharedPublication};
use crate::recorder::Recorder;
use crate::stats::{PublicationStats, RegistryStats};
use crate::subscription::{Attachment, Selection, SharedSubscription};

/// Name-keyed directory of publications
pub struct Registry {
    publications: HashMap<String, SharedPublication>,
    config: RegistryConfig,
    authorizer: Box<dyn Authorizer>,
}

impl Registry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with the given configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            publications: HashMap::new(),
            config,
            authorizer: Box::new(AllowAll),
        }
    }

    /// Install authorization hooks
    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Box::new(authorizer);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the publication registered under `name`
    pub fn publication(&self, name: &str) -> Option<SharedPublication> {
        self.publications.get(name).cloned()
    }

    /// Whether `name` exists, published or only awaited by subscribers
    pub fn contains(&self, name: &str) -> bool {
        self.publications.contains_key(name)
    }

    pub fn is_publishing(&self, name: &str) -> bool {
        self.publications
            .get(name)
            .is_some_and(|p| p.lock().is_publishing())
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.publications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }

    /// Registered names, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.publications.keys().map(String::as_str)
    }

    fn entry(&mut self, name: &str) -> (SharedPublication, bool) {
        if let Some(existing) = self.publications.get(name) {
            return (Arc::clone(existing), false);
        }
        let publication = Publication::new(name)
            .with_segment_options(self.config.segment_options())
            .shared();
        self.publications
            .insert(name.to_string(), Arc::clone(&publication));
        (publication, true)
    }

    /// Publication an attachment points at, if it is still registered
    fn resolve(&self, attachment: &Attachment) -> Option<SharedPublication> {
        self.publications
            .get(&attachment.name)
            .filter(|p| p.lock().id() == attachment.id)
            .cloned()
    }

    /// Erase `name` once it is stopped with nobody attached or waiting.
    fn erase_if_idle(&mut self, name: &str) {
        let idle = self.publications.get(name).is_some_and(|p| {
            let p = p.lock();
            !p.is_publishing() && p.subscriber_count() == 0 && p.waiting_count() == 0
        });
        if idle {
            self.publications.remove(name);
            tracing::info!(stream = %name, "Stream removed");
        }
    }

    /// Start publishing `name` (`base[.ext][?query]`).
    ///
    /// Query parameters become publication properties. An extension records
    /// the stream to `record_dir`; recording problems are logged and the
    /// publish goes on without it. Authorization failures roll the
    /// properties back.
    pub fn publish(&mut self, name: &str) -> Result<SharedPublication> {
        let stream = StreamName::parse(name)?;
        let (shared, _) = self.entry(&stream.base);
        let mut publication = shared.lock();

        if publication.is_publishing() {
            tracing::error!(stream = %stream.base, "Stream already publishing");
            return Err(Error::AlreadyPublishing(stream.base));
        }

        for (key, value) in stream.query.iter() {
            publication.set_property(key, value);
        }

        if let Err(reason) = self.authorizer.on_publish(&publication, &stream.query) {
            publication.clear_properties();
            drop(publication);
            return Err(self.deny(stream.base, reason));
        }

        let mut recorder = None;
        if let Some(ext) = &stream.extension {
            match MediaFormat::from_extension(ext) {
                None => tracing::warn!(
                    stream = %stream.base,
                    extension = %ext,
                    "Unsupported record format, publishing without recording"
                ),
                Some(format) => {
                    let path = self
                        .config
                        .record_dir
                        .join(format!("{}.{}", stream.base, ext));
                    if let Err(reason) = self.authorizer.on_record(&publication, &path) {
                        publication.clear_properties();
                        drop(publication);
                        return Err(self.deny(stream.base, reason));
                    }
                    match Recorder::create(&path, format) {
                        Ok(r) => recorder = Some(r),
                        Err(e) => tracing::warn!(
                            stream = %stream.base,
                            path = %path.display(),
                            error = %e,
                            "Cannot open record file, publishing without recording"
                        ),
                    }
                }
            }
        }

        publication.start(recorder);
        tracing::info!(
            stream = %stream.base,
            subscribers = publication.subscriber_count(),
            "Publisher registered"
        );
        drop(publication);
        Ok(shared)
    }

    fn deny(&mut self, name: String, reason: String) -> Error {
        tracing::warn!(stream = %name, reason = %reason, "Publish denied");
        self.erase_if_idle(&name);
        Error::Unauthorized { name, reason }
    }

    /// Stop a publication. Safe to call more than once.
    pub fn unpublish(&mut self, publication: &SharedPublication) {
        let name = {
            let mut p = publication.lock();
            p.stop();
            p.prune();
            p.name().to_string()
        };
        let registered = self
            .publications
            .get(&name)
            .is_some_and(|p| Arc::ptr_eq(p, publication));
        if registered {
            self.erase_if_idle(&name);
        }
    }

    /// Attach `subscription` to `name` (`base[?query]`).
    ///
    /// Absent publications are created and awaited unless `timeout=0`.
    /// Subscribing elsewhere while attached switches source: deferred to
    /// the next key frame when the new publication carries a selected video
    /// track, immediate otherwise.
    pub fn subscribe(&mut self, name: &str, subscription: &SharedSubscription) -> Result<()> {
        let stream = StreamName::parse(name)?;
        let selection = Selection::from_properties(&stream.query);

        if !selection.waits() && !self.is_publishing(&stream.base) {
            return Err(Error::NotFound(stream.base));
        }

        let (target, created) = self.entry(&stream.base);
        let denied = {
            let publication = target.lock();
            self.authorizer.on_subscribe(&publication, &stream.query).err()
        };
        if let Some(reason) = denied {
            tracing::warn!(stream = %stream.base, reason = %reason, "Subscribe denied");
            if created {
                self.publications.remove(&stream.base);
            }
            return Err(Error::Unauthorized {
                name: stream.base,
                reason,
            });
        }

        let target_id = target.lock().id();
        let (current, next) = {
            let mut sub = subscription.lock();
            let attachments = (sub.current().cloned(), sub.next().cloned());
            sub.configure(stream.query);
            attachments
        };

        // a new target supersedes any pending switch
        if let Some(next) = next.filter(|n| n.id != target_id) {
            subscription.lock().cancel_switch();
            if let Some(pending) = self.resolve(&next) {
                pending.lock().remove_waiting(subscription);
            }
            self.erase_if_idle(&next.name);
        }

        match current {
            Some(current) if current.id == target_id => {
                tracing::debug!(stream = %stream.base, "Subscription parameters updated");
            }
            None => {
                subscription.lock().attach(target_id, &stream.base);
                let mut publication = target.lock();
                publication.join(subscription);
                tracing::info!(
                    stream = %stream.base,
                    subscribers = publication.subscriber_count(),
                    publishing = publication.is_publishing(),
                    "Subscriber added"
                );
            }
            Some(current) => {
                let deferred = target.lock().tracks().has_video(selection.video);
                if deferred {
                    subscription.lock().wait_for(target_id, &stream.base);
                    target.lock().add_waiting(subscription);
                    tracing::info!(
                        from = %current.name,
                        to = %stream.base,
                        "Subscriber waiting for key frame to switch"
                    );
                } else {
                    subscription.lock().detach();
                    if let Some(old) = self.resolve(&current) {
                        old.lock().remove_subscriber(subscription);
                    }
                    self.erase_if_idle(&current.name);
                    subscription.lock().attach(target_id, &stream.base);
                    target.lock().join(subscription);
                    tracing::info!(
                        from = %current.name,
                        to = %stream.base,
                        "Subscriber switched"
                    );
                }
            }
        }
        Ok(())
    }

    /// Detach `subscription` from whatever it is attached to or waiting on.
    /// Safe to call when not attached.
    pub fn unsubscribe(&mut self, subscription: &SharedSubscription) {
        let (current, next) = subscription.lock().detach();
        for attachment in [current, next].into_iter().flatten() {
            if let Some(publication) = self.resolve(&attachment) {
                let mut p = publication.lock();
                p.remove_subscriber(subscription);
                p.remove_waiting(subscription);
                tracing::debug!(
                    stream = %attachment.name,
                    subscribers = p.subscriber_count(),
                    "Subscriber removed"
                );
            }
            self.erase_if_idle(&attachment.name);
        }
    }

    /// One maintenance pass: detach ejected subscribers, cancel switches
    /// whose consumer was ejected while waiting, and erase idle stopped
    /// publications. Returns the number of subscriptions detached.
    pub fn manage(&mut self) -> usize {
        let mut detached = 0;
        let publications: Vec<SharedPublication> = self.publications.values().cloned().collect();

        for publication in publications {
            let (attached, waiting) = publication.lock().take_ejected();

            for subscription in attached {
                let (reason, (_, next)) = {
                    let mut sub = subscription.lock();
                    (sub.ejected(), sub.detach())
                };
                if let Some(pending) = next.and_then(|n| self.resolve(&n)) {
                    pending.lock().remove_waiting(&subscription);
                }
                if let Some(reason) = reason {
                    tracing::info!(
                        stream = %publication.lock().name(),
                        reason = %reason,
                        "Subscriber ejected"
                    );
                }
                detached += 1;
            }

            for subscription in waiting {
                let (reason, (current, _)) = {
                    let mut sub = subscription.lock();
                    (sub.ejected(), sub.detach())
                };
                if let Some(old) = current.as_ref().and_then(|c| self.resolve(c)) {
                    old.lock().remove_subscriber(&subscription);
                }
                if let Some(reason) = reason {
                    tracing::info!(
                        stream = %publication.lock().name(),
                        from = ?current.map(|c| c.name),
                        reason = %reason,
                        "Switch cancelled, subscriber ejected"
                    );
                }
                detached += 1;
            }

            publication.lock().prune();
        }

        self.publications.retain(|name, publication| {
            let p = publication.lock();
            let keep = p.is_publishing() || p.subscriber_count() > 0 || p.waiting_count() > 0;
            if !keep {
                tracing::info!(stream = %name, "Stream removed by maintenance");
            }
            keep
        });
        detached
    }

    /// Spawn the periodic maintenance task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_maintenance_task(registry: &Arc<Mutex<Self>>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(registry);
        let interval = registry.lock().config.maintenance_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let detached = registry.lock().manage();
                if detached > 0 {
                    tracing::debug!(detached = detached, "Maintenance pass");
                }
            }
        })
    }

    pub fn publication_stats(&self, name: &str) -> Option<PublicationStats> {
        self.publications.get(name).map(|p| p.lock().stats())
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for publication in self.publications.values() {
            stats.add(&publication.lock().stats());
        }
        stats
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("publications", &self.publications.len())
            .field("config", &self.config)
            .finish()
    }
}
