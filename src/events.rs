use crate::source::RawLog;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};

sol! {
    event Approval(address indexed owner, address indexed spender, uint256 value);

    function symbol() external view returns (string);
    function name() external view returns (string);
}

pub fn decode_approval_event(log: &RawLog) -> alloy::sol_types::Result<Approval> {
    Approval::decode_raw_log(&log.topics, &log.data)
}

/// Decodes the output of a `symbol()`/`name()` call. Early tokens (MKR, SAI)
/// return a bare `bytes32` instead of a `string`.
pub fn decode_token_string<C>(output: &[u8]) -> Option<String>
where
    C: SolCall<Return = String>,
{
    let text = match C::abi_decode_returns(output) {
        Ok(text) => text,
        Err(_) if output.len() == 32 => String::from_utf8_lossy(output).into_owned(),
        Err(_) => return None,
    };

    let text = text.trim_matches(char::from(0)).trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
