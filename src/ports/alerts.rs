pub trait AlertPresenter: Clone + Send + Sync + 'static {
    fn present(&self, title: &str, body: &str);
}

pub trait PushRegistrar: Clone + Send + Sync + 'static {
    /// `None` when the platform refuses notification permission.
    fn device_token(&self) -> Option<String>;
}
