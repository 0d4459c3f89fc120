pub mod imgbb;
pub mod openai;
pub mod serpapi;
