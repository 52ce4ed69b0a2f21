/// 需要用户确认的步骤 (草稿先开票再发送, 缺少 POD 时改存草稿)
pub trait Confirm: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

/// 非交互模式: 一律同意
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

/// 非交互模式: 一律拒绝
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeNo;

impl Confirm for AssumeYes {
    fn confirm(&self, message: &str) -> bool {
        tracing::info!("auto-confirmed: {}", message);
        true
    }
}

impl Confirm for AssumeNo {
    fn confirm(&self, message: &str) -> bool {
        tracing::info!("auto-declined: {}", message);
        false
    }
}

/// 用闭包作答, 便于交互终端和测试
pub struct ConfirmWith<F>(pub F);

impl<F> Confirm for ConfirmWith<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, message: &str) -> bool {
        (self.0)(message)
    }
}
