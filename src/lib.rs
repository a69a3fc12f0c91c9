//! Live media publish/subscribe core
//!
//! A producer publishes a named stream and writes timestamped audio, video
//! and data packets into its [`Publication`]. Every write is fanned out
//! synchronously to the subscriptions attached through the [`Registry`], to
//! an optional file [`Recorder`], and to an optional [`Segments`] window
//! that cuts the stream into playlist segments.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use media_relay::media::{AudioCodec, AudioTag, DataType, VideoTag};
//! use media_relay::{Registry, Subscription, Target};
//!
//! struct Printer;
//!
//! impl Target for Printer {
//!     fn write_audio(&mut self, track: u8, tag: &AudioTag, packet: &Bytes) {
//!         println!("audio {} @{}: {} bytes", track, tag.time, packet.len());
//!     }
//!     fn write_video(&mut self, _: u8, _: &VideoTag, _: &Bytes) {}
//!     fn write_data(&mut self, _: u8, _: DataType, _: &Bytes) {}
//! }
//!
//! let mut registry = Registry::new();
//! let subscription = Subscription::shared(Printer);
//! registry.subscribe("live", &subscription)?;
//!
//! let publication = registry.publish("live")?;
//! let config = AudioTag::new(AudioCodec::Aac, 0).config();
//! publication.lock().write_audio(1, &config, &Bytes::from_static(&[0x12, 0x10]));
//! publication.lock().flush(None);
//!
//! registry.unpublish(&publication);
//! registry.unsubscribe(&subscription);
//! assert!(registry.is_empty());
//! # Ok::<(), media_relay::Error>(())
//! ```

pub mod error;
pub mod media;
pub mod publication;
pub mod recorder;
pub mod registry;
pub mod segments;
pub mod stats;
pub mod subscription;

pub use error::{Error, MediaError, Result};
pub use publication::{Publication, PublicationId, PublishingState, SharedPublication};
pub use recorder::Recorder;
pub use registry::{Authorizer, Registry, RegistryConfig, StreamName};
pub use segments::{Segment, Segments};
pub use stats::{PublicationStats, RegistryStats};
pub use subscription::{Ejected, Selection, SharedSubscription, Subscription, Target, TrackFilter};
