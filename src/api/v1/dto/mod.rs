pub mod volcanoes;
