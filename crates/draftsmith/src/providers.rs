pub mod base;
pub mod bedrock;
pub mod claude;
pub mod factory;
pub mod openai;
pub mod refine;
pub mod request;
pub mod stream;
pub mod utils;

#[cfg(test)]
pub mod mock;
