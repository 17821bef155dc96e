pub mod prelude;

pub mod photos;
