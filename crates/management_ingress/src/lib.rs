pub mod api;
pub mod constants;
pub mod controllers;
pub mod diff;
pub mod util;

#[cfg(test)]
pub mod tests;
