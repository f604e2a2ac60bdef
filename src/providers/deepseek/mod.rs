mod deepseek;

pub use deepseek::DeepSeekProvider;
