//! Courier Harness
//!
//! Collaborators for exercising the courier engine without a real chat
//! client:
//!
//! - **SimulatedConnector**: on-disk pairing and an outbox file, for demos
//! - **MockConnector** (`testing`): scripted lifecycle, send faults, mid-batch drops
//! - **MockTimeSource** (`testing`): a clock that only moves when told to
//! - **EventRecorder** (`testing`): keeps the app event stream for assertions
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // Requires the "testing" feature
//! use courier_harness::{EventRecorder, MockConnector};
//! use courier_runtime::RuntimeBuilder;
//!
//! let connector = MockConnector::new();
//! let runtime = RuntimeBuilder::new(Arc::new(connector.clone()))
//!     .auto_start(true)
//!     .build_and_start()
//!     .await?;
//! let mut events = EventRecorder::new(runtime.subscribe());
//! ```

pub mod simulated;

#[cfg(any(test, feature = "testing"))]
pub mod mock_connector;

#[cfg(any(test, feature = "testing"))]
pub mod mock_time;

#[cfg(any(test, feature = "testing"))]
pub mod recorder;

pub use simulated::{SimulatedConnector, StoredCredentials, CREDENTIALS_FILE, OUTBOX_FILE};

#[cfg(any(test, feature = "testing"))]
pub use mock_connector::{ConnectScript, MockConnector, SentMessage};

#[cfg(any(test, feature = "testing"))]
pub use mock_time::MockTimeSource;

#[cfg(any(test, feature = "testing"))]
pub use recorder::EventRecorder;
