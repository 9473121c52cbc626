pub mod capture_device;
pub mod record_delegate;
pub mod stream_encoder;
