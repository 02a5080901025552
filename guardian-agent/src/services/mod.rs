pub mod crypto;
pub mod events;
pub mod guardiankey;
pub mod mailer;
pub mod store;
pub mod template;

pub use events::{EventProcessor, EventReceipt};
pub use guardiankey::{
    AccessCheckRequest, GuardianKeyClient, MockRiskClient, Registration, RiskClient,
};
pub use mailer::{Mailer, MockMailer, OutgoingMail, SmtpMailer};
pub use store::{AgentStore, MemoryStore, MongoStore};
