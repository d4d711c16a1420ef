use alloy::primitives::Address;
use serde::Deserialize;

/// The tracked contracts of the token economy, one snapshot each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    Token,
    Auction,
    Bpd,
    ForeignSwap,
    NativeSwap,
    Staking,
    SubBalances,
}

impl ContractKind {
    pub fn name(self) -> &'static str {
        match self {
            ContractKind::Token => "token",
            ContractKind::Auction => "auction",
            ContractKind::Bpd => "bpd",
            ContractKind::ForeignSwap => "foreign_swap",
            ContractKind::NativeSwap => "native_swap",
            ContractKind::Staking => "staking",
            ContractKind::SubBalances => "sub_balances",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractAddresses {
    pub token: Option<Address>,
    pub auction: Option<Address>,
    pub bpd: Option<Address>,
    pub foreign_swap: Option<Address>,
    pub native_swap: Option<Address>,
    pub staking: Option<Address>,
    pub sub_balances: Option<Address>,
}

impl ContractAddresses {
    pub fn get(&self, kind: ContractKind) -> Option<Address> {
        match kind {
            ContractKind::Token => self.token,
            ContractKind::Auction => self.auction,
            ContractKind::Bpd => self.bpd,
            ContractKind::ForeignSwap => self.foreign_swap,
            ContractKind::NativeSwap => self.native_swap,
            ContractKind::Staking => self.staking,
            ContractKind::SubBalances => self.sub_balances,
        }
    }
}
