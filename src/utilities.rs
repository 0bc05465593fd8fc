pub mod api_utils;
pub mod config;
pub mod logchamp;

#[cfg(test)]
pub mod test_fixtures;
