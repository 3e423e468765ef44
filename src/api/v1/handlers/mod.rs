pub mod health;
pub mod volcanoes;
