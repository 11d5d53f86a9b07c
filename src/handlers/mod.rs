// handlers/mod.rs - 3-Tier Handler Architecture
//
// Public (no auth) → Protected (bearer session) → Elevated (admin role,
// checked through the access policy).
pub mod elevated;
pub mod protected;
pub mod public;
pub mod utils;
