//! # postcraft-dispatch
//!
//! Delivers scheduled posts to LinkedIn.
//!
//! ## Module Structure
//! ```text
//! postcraft-dispatch/
//! ├── config.rs      # DispatcherConfig (TOML + env)
//! ├── dispatcher.rs  # Dispatcher::run_cycle, CycleSummary
//! ├── error.rs       # DispatchError, PublishError
//! ├── linkedin.rs    # LinkedInPublisher (UGC Posts API)
//! ├── notifier.rs    # DispatchNotifier + Tracing / NoOp
//! └── publisher.rs   # SocialPublisher trait, MockPublisher
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let config = DispatcherConfig::load(None)?;
//! let publisher = Arc::new(LinkedInPublisher::new(&config.linkedin)?);
//! let dispatcher = Dispatcher::new(db, publisher, config)
//!     .with_notifier(Arc::new(TracingNotifier));
//!
//! let summary = dispatcher.run_cycle(Utc::now()).await?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod linkedin;
pub mod notifier;
pub mod publisher;

pub use config::{DispatchSettings, DispatcherConfig, LinkedInSettings};
pub use dispatcher::{CycleSummary, Dispatcher, PostOutcome, PostResult};
pub use error::{DispatchError, DispatchResult, PublishError, PublishResult};
pub use linkedin::LinkedInPublisher;
pub use notifier::{DispatchNotifier, NoOpNotifier, TracingNotifier};
pub use publisher::{MockPublisher, PostVisibility, PublishReceipt, PublishRequest, SocialPublisher};
