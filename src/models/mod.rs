mod click;
mod link;

pub use click::{ClickEvent, NewClickEvent};
pub use link::{CodeOrigin, CreateLinkRequest, InvalidCodeOrigin, NewLink, ShortLink};
