//! 额度流水（不持久化，只用于核对单个任务的扣费与退款）

use serde::{Deserialize, Serialize};

/// 单个任务的额度流水
///
/// 对于进入过 `Scanning` 的任务，终止时满足
/// `deducted - refunded == 实际计费页数`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// 任务计划消耗的页数
    pub requested: u32,
    /// 实际扣除的页数（扣费失败时为 0）
    pub deducted: u32,
    /// 已退还的页数
    pub refunded: u32,
}

impl CreditTransaction {
    pub fn new(requested: u32) -> Self {
        Self {
            requested,
            ..Self::default()
        }
    }

    /// 最终计费页数
    pub fn charged(&self) -> u32 {
        self.deducted.saturating_sub(self.refunded)
    }

    pub(crate) fn record_deduction(&mut self, pages: u32) {
        self.deducted += pages;
    }

    pub(crate) fn record_refund(&mut self, pages: u32) {
        self.refunded = (self.refunded + pages).min(self.deducted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_never_exceeds_deduction() {
        let mut tx = CreditTransaction::new(3);
        tx.record_deduction(3);
        tx.record_refund(2);
        assert_eq!(tx.charged(), 1);
        tx.record_refund(5);
        assert_eq!(tx.refunded, 3);
        assert_eq!(tx.charged(), 0);
    }
}
