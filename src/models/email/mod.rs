pub mod api_email;
pub mod email_row;
pub mod new_email;

pub use api_email::ApiEmail;
pub use email_row::{Direction, EmailRow, EmailStatus};
pub use new_email::NewEmail;
