pub mod aider;
pub mod chat;
pub mod doctor;
pub mod history;
pub mod improvements;
pub mod slash;
