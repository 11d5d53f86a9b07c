pub mod mailer;
pub mod resources;

pub use mailer::{MailKind, Mailer, MemoryOutbox, OutboundMail, SmtpMailer, TracingMailer};
pub use resources::{ResourceError, ResourceKind, ResourceService, BOOTCAMPS, COURSES, REVIEWS};
