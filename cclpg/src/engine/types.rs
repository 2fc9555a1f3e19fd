use crate::error::{CclError, Result};
use crate::types::{DataType, ReduceOp};

/// Element datatype tags understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineDatatype {
    Int8,
    Uint8,
    Int,
    Int64,
    Float,
    Double,
    Bfp16,
}

impl EngineDatatype {
    pub const fn size_in_bytes(self) -> usize {
        match self {
            EngineDatatype::Int8 | EngineDatatype::Uint8 => 1,
            EngineDatatype::Bfp16 => 2,
            EngineDatatype::Int | EngineDatatype::Float => 4,
            EngineDatatype::Int64 | EngineDatatype::Double => 8,
        }
    }
}

/// Reduction tags understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineReduction {
    Sum,
    Prod,
    Min,
    Max,
}

/// Convert a tensor dtype to the engine datatype.
pub fn to_engine_dtype(dt: DataType, operation: &'static str) -> Result<EngineDatatype> {
    match dt {
        DataType::U8 => Ok(EngineDatatype::Uint8),
        DataType::I8 => Ok(EngineDatatype::Int8),
        DataType::F64 => Ok(EngineDatatype::Double),
        DataType::F32 => Ok(EngineDatatype::Float),
        DataType::BF16 => Ok(EngineDatatype::Bfp16),
        DataType::I32 => Ok(EngineDatatype::Int),
        DataType::I64 => Ok(EngineDatatype::Int64),
        DataType::F16 | DataType::U32 | DataType::U64 | DataType::Bool => {
            Err(CclError::UnsupportedDType {
                dtype: dt,
                operation,
            })
        }
    }
}

/// Convert a reduction op to the engine reduction.
pub fn to_engine_op(op: ReduceOp, operation: &'static str) -> Result<EngineReduction> {
    match op {
        ReduceOp::Sum => Ok(EngineReduction::Sum),
        ReduceOp::Prod => Ok(EngineReduction::Prod),
        ReduceOp::Min => Ok(EngineReduction::Min),
        ReduceOp::Max => Ok(EngineReduction::Max),
        ReduceOp::BAnd | ReduceOp::BOr | ReduceOp::BXor => {
            Err(CclError::UnsupportedReduceOp { op, operation })
        }
    }
}
