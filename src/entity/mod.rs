//! SeaORM entity definitions for the rows the authentication core touches.
//!
//! The schema itself is created and migrated by the platform's database
//! pipeline; these definitions only describe the columns this core reads and
//! writes.

pub mod group;
pub mod group_member;
pub mod session_token;
pub mod user;
pub mod user_token;
pub mod webhook_secret;
