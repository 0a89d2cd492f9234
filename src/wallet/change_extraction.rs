use crate::tx::OutputRecord;

pub struct OutputsStructure {
    pub changes: Vec<OutputRecord>,
    pub fixed_outputs: Vec<OutputRecord>,
}

/// Splits a transaction's outputs into change returned to the wallet and
/// the payments it was built for.
pub fn extract_changes(outputs: &[OutputRecord]) -> OutputsStructure {
    let mut changes: Vec<OutputRecord> = vec![];
    let mut fixed_outputs: Vec<OutputRecord> = vec![];

    for output in outputs.iter() {
        if output.owned && output.change {
            changes.push(output.clone());
        } else {
            fixed_outputs.push(output.clone());
        }
    }

    OutputsStructure {
        changes,
        fixed_outputs,
    }
}

#[cfg(test)]
mod tests {
    use crate::tx::OutputRecord;
    use crate::types::OutputType;
    use crate::wallet::change_extraction::extract_changes;

    fn output(index: u32, owned: bool, change: bool) -> OutputRecord {
        OutputRecord {
            index,
            output_type: OutputType::Hidden,
            value: 10 + index as u64,
            blinding: None,
            owned,
            change,
        }
    }

    #[test]
    fn check_split_one_change() {
        let outputs = vec![output(0, false, false), output(1, true, true), output(2, true, false)];
        let result = extract_changes(&outputs);
        assert_eq!(result.changes, vec![output(1, true, true)]);
        assert_eq!(
            result.fixed_outputs,
            vec![output(0, false, false), output(2, true, false)]
        );
    }

    #[test]
    fn check_split_no_change() {
        let outputs = vec![output(0, false, false)];
        let result = extract_changes(&outputs);
        assert!(result.changes.is_empty());
        assert_eq!(result.fixed_outputs, outputs);
    }
}
