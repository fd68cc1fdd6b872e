//! Solidity interface of the settlement contract.
//!
//! Only the one payable entry point the funding pipeline calls is declared:
//! a swap of native currency into the recipient's token through a Uniswap V3
//! pool, followed by a transfer according to a signed intent.

use alloy_sol_types::sol;

sol! {
    /// Transfers contract: native-currency swap-and-transfer entry point.
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    interface ITransfers {
        struct TransferIntent {
            uint256 recipientAmount;
            uint256 deadline;
            address recipient;
            address recipientCurrency;
            address refundDestination;
            uint256 feeAmount;
            bytes16 id;
            address operator;
            bytes signature;
            bytes prefix;
        }

        function swapAndTransferUniswapV3Native(
            TransferIntent calldata _intent,
            uint24 poolFeesTier
        ) external payable;
    }
}
