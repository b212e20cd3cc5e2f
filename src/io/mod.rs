pub mod control;
pub mod export;
pub mod layer;
pub mod linkage;
pub mod observed;
pub mod output;
