//! Pretty-printing in block / variable notation.
//!
//! ```text
//! 0: (%0, %1)
//!   %2 = *(%1, %1)
//!   br 1 (%2) unless %3
//!   return %2
//! ```

use super::fragment::Ir;
use rewire_runtime::Type;
use std::fmt;

impl fmt::Display for Ir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            write!(f, "{}:", i)?;
            if block.num_params() > 0 {
                write!(f, " (")?;
                for (k, (v, ty)) in block.params.iter().enumerate() {
                    if k > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                    if *ty != Type::Any {
                        write!(f, " :: {}", ty)?;
                    }
                }
                write!(f, ")")?;
            }
            writeln!(f)?;
            for (v, st) in &block.body {
                write!(f, "  {} = {}", v, st.expr)?;
                if st.ty != Type::Any {
                    write!(f, " :: {}", st.ty)?;
                }
                writeln!(f)?;
            }
            for br in &block.branches {
                writeln!(f, "  {}", br)?;
            }
        }
        Ok(())
    }
}
