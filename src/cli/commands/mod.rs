pub mod rankings;
pub mod results;
pub mod token;
