//! 단계별 트레일링 스톱 상태 전이 함수.
//!
//! 수익 구간별로 손절 가격을 끌어올리는 순수 함수입니다:
//! - 수익 구간(티어)별 이익 잠금: 높은 구간이 낮은 구간을 덮어씀
//! - 손절 단조성: 기존 스톱보다 이익을 더 보호하는 방향으로만 이동
//! - 드로다운 보호: 피크 수익의 절반 아래로 되돌리면 즉시 청산
//!
//! 모든 상태 변경(피크 수익률 갱신, 새 스톱 저장)은 호출자인
//! `PositionMonitor`의 책임입니다.

use guard_core::domain::{CloseReason, Direction};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// 수익 구간 테이블: (발동 수익률 %, 잠금 비율).
///
/// 오름차순으로 평가되며 마지막으로 충족된 구간이 적용됩니다.
/// 첫 구간은 사실상 브레이크이븐(진입가 + 0.1%)입니다.
const PROFIT_TIERS: [(Decimal, Decimal); 5] = [
    (dec!(1), dec!(0.001)),
    (dec!(3), dec!(0.01)),
    (dec!(5), dec!(0.02)),
    (dec!(8), dec!(0.04)),
    (dec!(12), dec!(0.06)),
];

/// 드로다운 보호가 활성화되는 최소 피크 수익률 (%).
const DRAWDOWN_ACTIVATION_PCT: Decimal = dec!(3);

/// 피크 대비 허용 되돌림 비율. 피크의 절반 아래로 떨어지면 청산합니다.
const DRAWDOWN_RETRACE_RATIO: Decimal = dec!(0.5);

/// 한 번의 평가에 필요한 입력.
#[derive(Debug, Clone, Copy)]
pub struct TrailingInput {
    /// 진입 가격
    pub entry_price: Decimal,
    /// 현재 시장 가격
    pub current_price: Decimal,
    /// 현재 손절 가격 (없으면 None)
    pub current_stop_loss: Option<Decimal>,
    /// 포지션 방향
    pub direction: Direction,
    /// 프로세스 시작 이후 관측된 피크 수익률 (%).
    /// 호출자가 매 사이클 `max(기존, 현재 수익률)`로 갱신한 값입니다.
    pub highest_pnl_pct: Decimal,
}

/// 평가 결과.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingDecision {
    /// 즉시 청산 여부
    pub should_close: bool,
    /// 청산 사유 (`should_close`일 때만 Some)
    pub close_reason: Option<CloseReason>,
    /// 갱신할 손절 가격. 기존 스톱을 개선하지 못하면 None입니다.
    pub new_stop_loss: Option<Decimal>,
}

impl TrailingDecision {
    fn hold() -> Self {
        Self {
            should_close: false,
            close_reason: None,
            new_stop_loss: None,
        }
    }
}

/// 트레일링 스톱 평가기.
///
/// 결정적이고 부수효과가 없습니다. 동일 입력은 항상 동일 출력을
/// 반환합니다.
pub struct TrailingStopEngine;

impl TrailingStopEngine {
    /// 현재 가격에 대해 포지션의 트레일링 스톱 전이를 평가합니다.
    pub fn evaluate(input: &TrailingInput) -> TrailingDecision {
        let mut decision = TrailingDecision::hold();

        let pnl_pct = Self::pnl_pct(input);

        // 수익 중일 때만 티어 적용
        if pnl_pct > Decimal::ZERO {
            for (threshold_pct, lock_fraction) in PROFIT_TIERS {
                if pnl_pct > threshold_pct {
                    decision.new_stop_loss = Some(Self::locked_stop(input, lock_fraction));
                }
            }
        }

        // 드로다운 보호: 티어 결과와 무관하게 매 호출 평가
        if input.highest_pnl_pct > DRAWDOWN_ACTIVATION_PCT
            && pnl_pct < input.highest_pnl_pct * DRAWDOWN_RETRACE_RATIO
        {
            return TrailingDecision {
                should_close: true,
                close_reason: Some(CloseReason::DrawdownProtection),
                new_stop_loss: None,
            };
        }

        // 단조성: 기존 스톱을 개선하지 못하는 후보는 버림
        if let (Some(candidate), Some(current)) = (decision.new_stop_loss, input.current_stop_loss)
        {
            let improves = match input.direction {
                Direction::Long => candidate > current,
                Direction::Short => candidate < current,
            };
            if !improves {
                decision.new_stop_loss = None;
            }
        }

        decision
    }

    /// 방향 보정 수익률 (%).
    fn pnl_pct(input: &TrailingInput) -> Decimal {
        if input.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let raw = (input.current_price - input.entry_price) / input.entry_price * dec!(100);
        input.direction.adjust(raw)
    }

    /// 잠금 비율에 해당하는 손절 후보 가격.
    fn locked_stop(input: &TrailingInput, lock_fraction: Decimal) -> Decimal {
        match input.direction {
            Direction::Long => input.entry_price * (Decimal::ONE + lock_fraction),
            Direction::Short => input.entry_price * (Decimal::ONE - lock_fraction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn long_input(current_price: Decimal, stop: Decimal, highest: Decimal) -> TrailingInput {
        TrailingInput {
            entry_price: dec!(100),
            current_price,
            current_stop_loss: Some(stop),
            direction: Direction::Long,
            highest_pnl_pct: highest,
        }
    }

    #[test]
    fn test_breakeven_tier_long() {
        // 2% 수익: 첫 구간만 충족, 스톱은 진입가 + 0.1%
        let decision = TrailingStopEngine::evaluate(&long_input(dec!(102), dec!(95), dec!(2)));
        assert!(!decision.should_close);
        assert_eq!(decision.new_stop_loss, Some(dec!(100.1)));
    }

    #[test]
    fn test_highest_qualifying_tier_wins_long() {
        // 6% 수익: >5% 구간이 적용되어 2% 잠금
        let decision = TrailingStopEngine::evaluate(&long_input(dec!(106), dec!(95), dec!(6)));
        assert_eq!(decision.new_stop_loss, Some(dec!(102.00)));

        // 13% 수익: 최상위 구간, 6% 잠금
        let decision = TrailingStopEngine::evaluate(&long_input(dec!(113), dec!(95), dec!(13)));
        assert_eq!(decision.new_stop_loss, Some(dec!(106.00)));
    }

    #[test]
    fn test_short_tier_locks_below_entry() {
        // 숏 8% 수익 (가격 92): >5% 구간, 스톱 = 진입가 * 0.98
        let decision = TrailingStopEngine::evaluate(&TrailingInput {
            entry_price: dec!(100),
            current_price: dec!(92),
            current_stop_loss: Some(dec!(105)),
            direction: Direction::Short,
            highest_pnl_pct: dec!(8),
        });
        assert!(!decision.should_close);
        assert_eq!(decision.new_stop_loss, Some(dec!(98.00)));

        // 숏 9% 수익 (가격 91): >8% 구간, 스톱 = 진입가 * 0.96
        let decision = TrailingStopEngine::evaluate(&TrailingInput {
            entry_price: dec!(100),
            current_price: dec!(91),
            current_stop_loss: Some(dec!(105)),
            direction: Direction::Short,
            highest_pnl_pct: dec!(9),
        });
        assert_eq!(decision.new_stop_loss, Some(dec!(96.00)));
    }

    #[test]
    fn test_no_tier_at_or_below_zero_pnl() {
        let decision = TrailingStopEngine::evaluate(&long_input(dec!(100), dec!(95), dec!(0)));
        assert_eq!(decision.new_stop_loss, None);

        let decision = TrailingStopEngine::evaluate(&long_input(dec!(97), dec!(95), dec!(0)));
        assert_eq!(decision.new_stop_loss, None);
        assert!(!decision.should_close);
    }

    #[test]
    fn test_drawdown_protection_closes() {
        // 피크 10%, 현재 3% (< 10 * 0.5) → 청산
        let decision = TrailingStopEngine::evaluate(&long_input(dec!(103), dec!(100.1), dec!(10)));
        assert!(decision.should_close);
        assert_eq!(decision.close_reason, Some(CloseReason::DrawdownProtection));
        assert_eq!(decision.new_stop_loss, None);
    }

    #[test]
    fn test_drawdown_requires_minimum_peak() {
        // 피크 2%는 활성화 기준(3%) 미만이라 되돌려도 청산하지 않음
        let decision = TrailingStopEngine::evaluate(&long_input(dec!(100.5), dec!(95), dec!(2)));
        assert!(!decision.should_close);
    }

    #[test]
    fn test_drawdown_overrides_tier_adjustment() {
        // 현재 6% 수익이지만 피크 15%에서 절반 넘게 되돌림 → 스톱 갱신 대신 청산
        let decision = TrailingStopEngine::evaluate(&long_input(dec!(106), dec!(95), dec!(15)));
        assert!(decision.should_close);
        assert_eq!(decision.new_stop_loss, None);
    }

    #[test]
    fn test_monotonic_stop_rejects_regression() {
        // 기존 스톱 104가 이미 후보(102)보다 좋음 → 후보 폐기
        let decision = TrailingStopEngine::evaluate(&long_input(dec!(106), dec!(104), dec!(6)));
        assert_eq!(decision.new_stop_loss, None);

        // 숏: 기존 스톱 97이 후보(98)보다 좋음 → 폐기
        let decision = TrailingStopEngine::evaluate(&TrailingInput {
            entry_price: dec!(100),
            current_price: dec!(93),
            current_stop_loss: Some(dec!(97)),
            direction: Direction::Short,
            highest_pnl_pct: dec!(7),
        });
        assert_eq!(decision.new_stop_loss, None);
    }

    #[test]
    fn test_missing_stop_accepts_candidate() {
        let decision = TrailingStopEngine::evaluate(&TrailingInput {
            entry_price: dec!(100),
            current_price: dec!(102),
            current_stop_loss: None,
            direction: Direction::Long,
            highest_pnl_pct: dec!(2),
        });
        assert_eq!(decision.new_stop_loss, Some(dec!(100.1)));
    }

    #[test]
    fn test_deterministic() {
        let input = long_input(dec!(106), dec!(95), dec!(6));
        let first = TrailingStopEngine::evaluate(&input);
        let second = TrailingStopEngine::evaluate(&input);
        assert_eq!(first, second);
    }

    #[test]
    fn test_tier_lock_fractions_strictly_increase() {
        let mut previous = Decimal::MIN;
        for (threshold_pct, lock_fraction) in PROFIT_TIERS {
            assert!(lock_fraction > previous, "tier {} regressed", threshold_pct);
            previous = lock_fraction;
        }
    }

    proptest! {
        /// 임의의 가격 시퀀스에서 롱 포지션의 스톱은 감소하지 않는다.
        #[test]
        fn prop_long_stop_never_decreases(prices in proptest::collection::vec(1u32..=200, 1..60)) {
            let entry = dec!(100);
            let mut stop = dec!(90);
            let mut highest = Decimal::ZERO;

            for price in prices {
                let current = Decimal::from(price);
                let raw_pnl = (current - entry) / entry * dec!(100);
                if raw_pnl > highest {
                    highest = raw_pnl;
                }

                let decision = TrailingStopEngine::evaluate(&TrailingInput {
                    entry_price: entry,
                    current_price: current,
                    current_stop_loss: Some(stop),
                    direction: Direction::Long,
                    highest_pnl_pct: highest,
                });

                if let Some(new_stop) = decision.new_stop_loss {
                    prop_assert!(new_stop > stop);
                    stop = new_stop;
                }
            }
        }
    }
}
