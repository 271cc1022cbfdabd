pub mod packet;
pub mod relay;
