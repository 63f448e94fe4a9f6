use crate::record::{FieldNames, Mutation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

pub const MEMBER_RANGE: RangeInclusive<u64> = 100_000_000..=999_999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagChoice {
    Fixed(bool),
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialInput {
    pub key: String,
    pub flag_value: bool,
    pub set_member: String,
}

impl TrialInput {
    pub fn flag_mutation(&self, fields: &FieldNames) -> Mutation {
        Mutation::flag(fields, self.flag_value)
    }

    pub fn set_mutation(&self, fields: &FieldNames) -> Mutation {
        Mutation::add_member(fields, &self.set_member)
    }
}

#[derive(Debug, Clone)]
pub struct MutationGenerator<R = StdRng> {
    rng: R,
    flag: FlagChoice,
}

impl MutationGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> MutationGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            flag: FlagChoice::Fixed(false),
        }
    }

    pub fn with_flag(mut self, flag: FlagChoice) -> Self {
        self.flag = flag;
        self
    }

    pub fn generate(&mut self) -> TrialInput {
        let key = self.rng.gen_range(MEMBER_RANGE).to_string();
        let set_member = self.rng.gen_range(MEMBER_RANGE).to_string();
        let flag_value = match self.flag {
            FlagChoice::Fixed(v) => v,
            FlagChoice::Random => self.rng.gen_bool(0.5),
        };
        TrialInput {
            key,
            flag_value,
            set_member,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use std::collections::HashSet;

    #[test]
    fn keys_and_members_are_nine_digit_numbers() {
        let mut generator = MutationGenerator::seeded(7);
        for _ in 0..1_000 {
            let input = generator.generate();
            for s in [&input.key, &input.set_member] {
                assert_eq!(s.len(), 9, "unexpected width: {}", s);
                let n: u64 = s.parse().expect("numeric");
                assert!(MEMBER_RANGE.contains(&n));
            }
            assert!(!input.flag_value);
        }
    }

    #[test]
    fn hundred_keys_are_pairwise_distinct() {
        let mut generator = MutationGenerator::seeded(0x5eed);
        let keys: HashSet<String> = (0..100).map(|_| generator.generate().key).collect();
        assert_eq!(keys.len(), 100);
    }

    #[test]
    fn same_seed_reproduces_sequence() {
        let mut a = MutationGenerator::seeded(42).with_flag(FlagChoice::Random);
        let mut b = MutationGenerator::seeded(42).with_flag(FlagChoice::Random);
        for _ in 0..50 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn constant_rng_produces_colliding_keys() {
        let mut generator = MutationGenerator::new(StepRng::new(0, 0));
        let first = generator.generate();
        let second = generator.generate();
        assert_eq!(first.key, second.key);
    }

    #[test]
    fn trial_input_builds_both_mutations() {
        let fields = FieldNames::default();
        let input = TrialInput {
            key: "100000000".into(),
            flag_value: true,
            set_member: "200000000".into(),
        };
        let flag = input.flag_mutation(&fields);
        assert_eq!(flag.unset, vec!["deleted".to_string()]);
        assert_eq!(flag.set.get("isProxy"), Some(&serde_json::json!(true)));
        let set = input.set_mutation(&fields);
        assert_eq!(
            set.add_to_set.get("profileIds"),
            Some(&serde_json::json!("200000000"))
        );
    }
}
