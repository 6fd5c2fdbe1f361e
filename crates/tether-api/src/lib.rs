pub mod auth;
pub mod chats;
pub mod convert;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod policy;
pub mod reactions;
pub mod state;
pub mod users;

#[cfg(test)]
pub(crate) mod testutil;
